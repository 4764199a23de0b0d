//! Registry of [`ContainerPool`]s keyed by function, created lazily on first use.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use super::container_pool::{ContainerPool, Lease};
use super::types::PoolConfig;
use crate::error::GatewayError;
use crate::worker::Worker;

/// Resolves the [`PoolConfig`] a newly-created pool should use for a given
/// function. A plain closure over `GatewaySettings` + per-function overrides
/// in the gateway binary; a constant closure in tests.
pub type PoolConfigResolver = Arc<dyn Fn(&str) -> PoolConfig + Send + Sync>;

/// Function-keyed registry of pools. Pools are created on demand and live
/// for the process lifetime; there is no API to remove one, matching the
/// "Pools live for the process lifetime" data-model invariant.
pub struct PoolManager {
    pools: DashMap<String, Arc<ContainerPool>>,
    resolve_config: PoolConfigResolver,
}

impl PoolManager {
    pub fn new(resolve_config: PoolConfigResolver) -> Self {
        Self {
            pools: DashMap::new(),
            resolve_config,
        }
    }

    pub fn with_default_config(config: PoolConfig) -> Self {
        Self::new(Arc::new(move |_function: &str| config.clone()))
    }

    fn pool_for(&self, function: &str) -> Arc<ContainerPool> {
        if let Some(pool) = self.pools.get(function) {
            return pool.clone();
        }
        let config = (self.resolve_config)(function);
        self.pools
            .entry(function.to_string())
            .or_insert_with(|| Arc::new(ContainerPool::new(function, config)))
            .clone()
    }

    /// Acquire a worker for `function`, creating its pool on first use.
    pub async fn acquire<F, Fut>(&self, function: &str, provision: F) -> Result<Lease, GatewayError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Vec<Worker>, GatewayError>>,
    {
        self.pool_for(function).acquire(provision).await
    }

    pub fn release(&self, function: &str, lease: Lease) {
        self.pool_for(function).release(lease);
    }

    pub fn evict(&self, function: &str, lease: Lease) {
        self.pool_for(function).evict(lease);
    }

    /// Insert an already-running worker discovered at startup or via
    /// reconciliation, creating its pool on first use.
    pub fn adopt(&self, function: &str, worker: Worker) {
        self.pool_for(function).adopt(worker);
    }

    /// Prune every pool's idle-expired workers. Only visits pools that
    /// already exist — a function with no traffic yet has no pool and
    /// nothing to prune.
    pub fn prune_all(&self, idle_timeout: Duration) -> HashMap<String, Vec<Worker>> {
        let mut result = HashMap::new();
        for entry in self.pools.iter() {
            let pruned = entry.value().prune(idle_timeout);
            if !pruned.is_empty() {
                result.insert(entry.key().clone(), pruned);
            }
        }
        result
    }

    /// Snapshot of every pool's live worker names, for heartbeat reporting.
    /// This is a read-only pass over each pool's own mutex and never blocks
    /// foreground `acquire`/`release` traffic for longer than one pool's lock.
    pub fn all_worker_names(&self) -> HashMap<String, Vec<String>> {
        self.pools
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().names()))
            .filter(|(_, names)| !names.is_empty())
            .collect()
    }

    pub fn function_names(&self) -> Vec<String> {
        self.pools.iter().map(|entry| entry.key().clone()).collect()
    }
}
