//! Drives worker-container lifecycle for every function: create-on-miss,
//! readiness probing, teardown, and orphan reconciliation against the
//! gateway's heartbeat reports.
//!
//! The Gateway is the sole caller; the Gateway never talks to the runtime
//! directly.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use gateway_core::error::GatewayError;
use gateway_core::worker::{Worker, now_epoch_secs};
use tracing::{info, warn};

use crate::runtime::ContainerRuntime;

pub struct OrchestratorService {
    runtime: Arc<dyn ContainerRuntime>,
    network: String,
    cold_start_timeout: Duration,
    /// function -> workers this service created, used both to answer
    /// `list()` scoped queries and as the "function namespace" reconcile
    /// scans against.
    workers: DashMap<String, Vec<Worker>>,
}

impl OrchestratorService {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, network: impl Into<String>, cold_start_timeout: Duration) -> Self {
        Self { runtime, network: network.into(), cold_start_timeout, workers: DashMap::new() }
    }

    /// Create `count` fresh containers for `function`, probing each for
    /// readiness before returning it. A readiness failure on any one of a
    /// multi-container request fails the whole call; containers already
    /// created are left running (the caller may retry, and `list`/reconcile
    /// will find them on a later pass).
    pub async fn provision(
        &self,
        function: &str,
        count: u32,
        image: Option<&str>,
        env: HashMap<String, String>,
    ) -> Result<Vec<Worker>, GatewayError> {
        let mut created = Vec::with_capacity(count as usize);
        for _ in 0..count.max(1) {
            let suffix = fastrand::u32(..);
            let name = format!("{function}-{suffix:08x}");
            let container = self.runtime.ensure_running(&name, image, &env, &self.network).await?;
            self.runtime.wait_ready(&container, self.cold_start_timeout).await?;

            let worker = Worker::new(container.id, container.name, container.ip_address, container.port);
            created.push(worker.clone());
            self.workers.entry(function.to_string()).or_default().push(worker);
        }

        info!(function, count = created.len(), "provisioned workers");
        Ok(created)
    }

    pub async fn delete(&self, worker_id: &str) -> Result<(), GatewayError> {
        self.runtime.stop(worker_id).await?;
        for mut entry in self.workers.iter_mut() {
            entry.value_mut().retain(|w| w.id != worker_id);
        }
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Worker>, GatewayError> {
        self.runtime.list().await
    }

    /// Stop and remove every worker in `function`'s namespace that was not
    /// reported in the last heartbeat AND has lived past `grace_period`.
    /// Younger unreported workers are spared: a worker created moments ago
    /// may not have made it into the gateway's first heartbeat tick yet.
    pub async fn reconcile(&self, function: &str, reported_names: &[String], grace_period: Duration) {
        let reported: HashSet<&str> = reported_names.iter().map(String::as_str).collect();
        let candidates: Vec<Worker> = self
            .workers
            .get(function)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        for worker in candidates {
            if reported.contains(worker.name.as_str()) {
                continue;
            }
            let age = now_epoch_secs().saturating_sub(worker.created_at);
            if age <= grace_period.as_secs() {
                continue;
            }
            warn!(function, worker = %worker.name, age_secs = age, "reconciling orphaned worker");
            if let Err(err) = self.delete(&worker.id).await {
                warn!(function, worker = %worker.name, error = %err, "failed to reap orphaned worker");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::FakeRuntime;

    fn service() -> OrchestratorService {
        OrchestratorService::new(Arc::new(FakeRuntime::new()), "bridge", Duration::from_secs(5))
    }

    #[tokio::test]
    async fn provision_creates_the_requested_count() {
        let svc = service();
        let workers = svc.provision("echo", 2, None, HashMap::new()).await.unwrap();
        assert_eq!(workers.len(), 2);
    }

    #[tokio::test]
    async fn delete_removes_worker_from_bookkeeping() {
        let svc = service();
        let workers = svc.provision("echo", 1, None, HashMap::new()).await.unwrap();
        svc.delete(&workers[0].id).await.unwrap();
        assert!(svc.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reconcile_spares_unreported_workers_within_grace_period() {
        let svc = service();
        svc.provision("echo", 1, None, HashMap::new()).await.unwrap();
        svc.reconcile("echo", &[], Duration::from_secs(3600)).await;
        assert_eq!(svc.list().await.unwrap().len(), 1, "young unreported worker must survive");
    }

    #[tokio::test]
    async fn reconcile_spares_reported_workers_regardless_of_age() {
        let svc = service();
        let workers = svc.provision("echo", 1, None, HashMap::new()).await.unwrap();
        svc.reconcile("echo", &[workers[0].name.clone()], Duration::from_secs(0)).await;
        assert_eq!(svc.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reconcile_reaps_unreported_workers_past_grace_period() {
        let svc = service();
        svc.provision("echo", 1, None, HashMap::new()).await.unwrap();
        // Worker.created_at has one-second resolution; wait past the second
        // boundary so age_secs() is provably > 0 before checking it against
        // a zero grace period.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        svc.reconcile("echo", &[], Duration::from_secs(0)).await;
        assert!(svc.list().await.unwrap().is_empty());
    }
}
