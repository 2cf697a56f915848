use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::HandleSlot;

/// The backend client an adapter owns, handed to the query layer untouched.
///
/// Built-in variants share the adapter's [`HandleSlot`], so closing the adapter
/// closes every handle it gave out: [`HandleSlot::get`] then fails with
/// `ConnectionClosed`. Nothing in this crate inspects the handle after construction.
#[derive(Clone)]
pub enum NativeHandle {
    #[cfg(feature = "postgres")]
    PostgresPool(HandleSlot<bb8::Pool<crate::postgres::PgManager>>),
    #[cfg(feature = "postgres")]
    PgPool(HandleSlot<deadpool::managed::Pool<crate::postgres::PgSessionManager>>),
    #[cfg(feature = "postgres")]
    PgClient(HandleSlot<Arc<tokio::sync::Mutex<crate::postgres::PgSession>>>),
    #[cfg(feature = "neon-websocket")]
    NeonWebsocketPool(HandleSlot<bb8::Pool<crate::neon::NeonWsManager>>),
    #[cfg(feature = "neon-http")]
    NeonHttp(HandleSlot<crate::neon::NeonHttpClient>),
    #[cfg(feature = "mysql")]
    MysqlPool(HandleSlot<mysql_async::Pool>),
    #[cfg(feature = "planetscale")]
    Planetscale(HandleSlot<crate::planetscale::PlanetscaleClient>),
    /// Handle of a driver registered at runtime.
    Custom(Arc<dyn Any + Send + Sync>),
    /// The adapter has been closed.
    Closed,
}

impl NativeHandle {
    /// True for [`NativeHandle::Closed`] and for a built-in handle whose adapter was
    /// closed after the handle was taken.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match self {
            #[cfg(feature = "postgres")]
            NativeHandle::PostgresPool(slot) => slot.is_closed(),
            #[cfg(feature = "postgres")]
            NativeHandle::PgPool(slot) => slot.is_closed(),
            #[cfg(feature = "postgres")]
            NativeHandle::PgClient(slot) => slot.is_closed(),
            #[cfg(feature = "neon-websocket")]
            NativeHandle::NeonWebsocketPool(slot) => slot.is_closed(),
            #[cfg(feature = "neon-http")]
            NativeHandle::NeonHttp(slot) => slot.is_closed(),
            #[cfg(feature = "mysql")]
            NativeHandle::MysqlPool(slot) => slot.is_closed(),
            #[cfg(feature = "planetscale")]
            NativeHandle::Planetscale(slot) => slot.is_closed(),
            NativeHandle::Custom(_) => false,
            NativeHandle::Closed => true,
        }
    }

    /// Downcast a custom handle.
    #[must_use]
    pub fn downcast_custom<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            NativeHandle::Custom(inner) => Arc::clone(inner).downcast::<T>().ok(),
            _ => None,
        }
    }

    fn variant(&self) -> &'static str {
        match self {
            #[cfg(feature = "postgres")]
            NativeHandle::PostgresPool(_) => "PostgresPool",
            #[cfg(feature = "postgres")]
            NativeHandle::PgPool(_) => "PgPool",
            #[cfg(feature = "postgres")]
            NativeHandle::PgClient(_) => "PgClient",
            #[cfg(feature = "neon-websocket")]
            NativeHandle::NeonWebsocketPool(_) => "NeonWebsocketPool",
            #[cfg(feature = "neon-http")]
            NativeHandle::NeonHttp(_) => "NeonHttp",
            #[cfg(feature = "mysql")]
            NativeHandle::MysqlPool(_) => "MysqlPool",
            #[cfg(feature = "planetscale")]
            NativeHandle::Planetscale(_) => "Planetscale",
            NativeHandle::Custom(_) => "Custom",
            NativeHandle::Closed => "Closed",
        }
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle::{}", self.variant())
    }
}
