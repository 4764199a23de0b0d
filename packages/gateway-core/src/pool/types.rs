use std::time::Duration;

/// Per-function pool sizing, sourced from [`crate::config::GatewaySettings`]
/// with optional per-function overrides.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_capacity: usize,
    pub min_capacity: usize,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_capacity: 4,
            min_capacity: 0,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}
