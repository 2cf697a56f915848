use serde::Serialize;

/// Pool counters sampled at call time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub total: usize,
    pub idle: usize,
    pub active: usize,
    /// Callers blocked waiting for a connection.
    pub waiting: usize,
}

impl ConnectionStats {
    /// Snapshot from total and idle counts.
    #[must_use]
    pub fn from_counts(total: usize, idle: usize, waiting: usize) -> Self {
        Self {
            total,
            idle,
            active: total.saturating_sub(idle),
            waiting,
        }
    }

    /// All zeros, as reported by a closed adapter.
    #[must_use]
    pub fn closed() -> Self {
        Self::default()
    }
}
