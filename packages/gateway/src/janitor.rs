//! Single long-lived task: prune idle workers, then report what remains to
//! the Orchestrator so it can reconcile orphans on its side.

use std::sync::Arc;

use gateway_core::trace;
use tokio::sync::oneshot;
use tokio::time::{Duration, interval};
use tracing::{error, info};

use crate::state::AppState;

pub struct HeartbeatJanitor {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl HeartbeatJanitor {
    pub fn spawn(state: Arc<AppState>, tick_interval: Duration, idle_timeout: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(tick_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_tick(&state, idle_timeout).await;
                    }
                    _ = &mut shutdown_rx => {
                        info!("heartbeat janitor shutting down");
                        break;
                    }
                }
            }
        });

        Self { shutdown_tx: Some(shutdown_tx), handle: Some(handle) }
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn run_tick(state: &Arc<AppState>, idle_timeout: Duration) {
    let trace_id = trace::generate();

    let pruned = state.pools.prune_all(idle_timeout);
    for (function, workers) in &pruned {
        for worker in workers {
            let orchestrator = state.orchestrator.clone();
            let worker_id = worker.id.clone();
            let trace_id = trace_id.clone();
            tokio::spawn(async move {
                if let Err(err) = orchestrator.delete(&worker_id, &trace_id).await {
                    error!(worker = worker_id, error = %err, "failed to delete pruned worker");
                }
            });
        }
        info!(function, pruned = workers.len(), "pruned idle workers");
    }

    let snapshot = state.pools.all_worker_names();
    for (function, names) in snapshot {
        if names.is_empty() {
            continue;
        }
        state.orchestrator.heartbeat(&function, &names, &trace_id).await;
    }
}
