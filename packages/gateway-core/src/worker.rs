//! The `Worker` type: a running container that serves one function's invocations.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A running container, identified by an opaque runtime id.
///
/// Identity is by `id` only: two `Worker`s with the same id are the same
/// container even if `last_used` has since diverged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub name: String,
    pub ip_address: String,
    pub port: u16,
    pub created_at: u64,
    pub last_used_at: u64,
}

impl Worker {
    pub fn new(id: impl Into<String>, name: impl Into<String>, ip_address: impl Into<String>, port: u16) -> Self {
        let now = now_epoch_secs();
        Self {
            id: id.into(),
            name: name.into(),
            ip_address: ip_address.into(),
            port,
            created_at: now,
            last_used_at: now,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip_address, self.port)
    }

    pub fn touch(&mut self) {
        self.last_used_at = now_epoch_secs();
    }

    pub fn age_secs(&self) -> u64 {
        now_epoch_secs().saturating_sub(self.created_at)
    }

    pub fn idle_secs(&self) -> u64 {
        now_epoch_secs().saturating_sub(self.last_used_at)
    }

    /// Recover the owning function name from `name`'s `{function}-{suffix}`
    /// shape, e.g. for reconstructing pool bookkeeping from a bare
    /// `OrchestratorClient::list()` snapshot at startup.
    pub fn function_name(&self) -> &str {
        self.name.rsplit_once('-').map(|(function, _suffix)| function).unwrap_or(&self.name)
    }
}

impl PartialEq for Worker {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Worker {}

pub fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
