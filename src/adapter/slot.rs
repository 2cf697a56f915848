use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use super::NativeHandle;
use crate::error::DriverError;
use crate::types::DriverId;

/// Holds an adapter's native handle until close.
///
/// Clones share one cell: the adapter keeps one and every [`NativeHandle`] it hands
/// out carries another, so emptying it on close drops the adapter's pool or session
/// for all of them at once. Handles are cheap clones (pools and HTTP clients are
/// reference counted); take one out with [`HandleSlot::get`] per use rather than
/// keeping it, since a held clone keeps the backend alive past close.
pub struct HandleSlot<T: Clone> {
    driver: DriverId,
    inner: Arc<Mutex<Option<T>>>,
}

impl<T: Clone> Clone for HandleSlot<T> {
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> fmt::Debug for HandleSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleSlot")
            .field("driver", &self.driver)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T: Clone> HandleSlot<T> {
    pub(crate) fn new(driver: DriverId, handle: T) -> Self {
        Self {
            driver,
            inner: Arc::new(Mutex::new(Some(handle))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The live handle.
    ///
    /// # Errors
    /// Returns `DriverError::ConnectionClosed` once the owning adapter was closed.
    pub fn get(&self) -> Result<T, DriverError> {
        self.lock()
            .clone()
            .ok_or_else(|| DriverError::closed(&self.driver))
    }

    pub(crate) fn peek(&self) -> Option<T> {
        self.lock().clone()
    }

    /// Empty the slot for every clone; `None` when it was already empty.
    pub(crate) fn take(&self) -> Option<T> {
        self.lock().take()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    /// A native handle sharing this slot, or `NativeHandle::Closed` once it was emptied.
    pub(crate) fn share(&self, wrap: fn(Self) -> NativeHandle) -> NativeHandle {
        if self.is_closed() {
            NativeHandle::Closed
        } else {
            wrap(self.clone())
        }
    }

    #[must_use]
    pub fn driver(&self) -> &DriverId {
        &self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_is_idempotent() {
        let slot = HandleSlot::new(DriverId::PG, 5_u8);
        assert_eq!(slot.get().unwrap(), 5);
        assert_eq!(slot.take(), Some(5));
        assert_eq!(slot.take(), None);
        assert!(slot.is_closed());
        assert!(matches!(
            slot.get(),
            Err(DriverError::ConnectionClosed(_))
        ));
    }

    #[test]
    fn take_empties_every_clone() {
        let held = Arc::new(());
        let slot = HandleSlot::new(DriverId::POSTGRES, Arc::clone(&held));
        let shared = slot.clone();
        assert_eq!(Arc::strong_count(&held), 2);

        assert!(slot.take().is_some());
        assert!(shared.is_closed());
        assert!(matches!(
            shared.get(),
            Err(DriverError::ConnectionClosed(_))
        ));
        assert_eq!(Arc::strong_count(&held), 1);
    }
}
