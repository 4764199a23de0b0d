//! Bounded per-function worker pool.
//!
//! The semaphore is acquired *before* the idle queue is consulted: this
//! bounds parallelism at `N` without reserving any particular worker, so an
//! idle worker can be reused by whichever waiter gets to it first and a cold
//! start only happens when none is free.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use super::types::PoolConfig;
use crate::error::GatewayError;
use crate::worker::Worker;

/// An idle worker paired with an `Instant` marking when it went idle. The
/// `Instant` gives prune sub-second precision; `Worker::last_used_at`
/// (epoch seconds) stays on the wire shape for heartbeat/provision payloads.
struct IdleEntry {
    worker: Worker,
    went_idle_at: Instant,
}

struct State {
    idle: VecDeque<IdleEntry>,
    all: Vec<Worker>,
}

/// A bounded pool of warm workers for a single function.
pub struct ContainerPool {
    function: String,
    config: PoolConfig,
    semaphore: std::sync::Arc<Semaphore>,
    state: Mutex<State>,
}

/// An acquired worker together with the permit that bounds its concurrency
/// slot. Dropping this without calling `release`/`evict` would leak the
/// permit forever, so callers must always route through one of those two.
pub struct Lease {
    pub worker: Worker,
    permit: OwnedSemaphorePermit,
}

impl Lease {
    pub fn worker(&self) -> &Worker {
        &self.worker
    }
}

impl ContainerPool {
    pub fn new(function: impl Into<String>, config: PoolConfig) -> Self {
        let max = config.max_capacity.max(1);
        Self {
            function: function.into(),
            config,
            semaphore: std::sync::Arc::new(Semaphore::new(max)),
            state: Mutex::new(State {
                idle: VecDeque::new(),
                all: Vec::new(),
            }),
        }
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquire a worker, waiting on the semaphore up to `acquire_timeout`.
    /// `provision` is invoked only when no idle worker is available; it MUST
    /// return at least one worker. Extra workers it returns are adopted into
    /// the idle queue (pre-warm), each consuming one more permit, bounded by
    /// however many permits remain.
    pub async fn acquire<F, Fut>(&self, provision: F) -> Result<Lease, GatewayError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Vec<Worker>, GatewayError>>,
    {
        let semaphore = self.semaphore.clone();
        let permit = tokio::time::timeout(self.config.acquire_timeout, semaphore.acquire_owned())
            .await
            .map_err(|_| GatewayError::AcquireTimeout)?
            .expect("pool semaphore closed unexpectedly");

        if let Some(worker) = self.pop_idle() {
            debug!(function = %self.function, worker = %worker.id, "reusing idle worker");
            return Ok(Lease { worker, permit });
        }

        match provision(self.function.clone()).await {
            Ok(mut workers) if !workers.is_empty() => {
                let first = workers.remove(0);
                self.register(first.clone());
                self.adopt_prewarm_extras(workers);
                Ok(Lease { worker: first, permit })
            }
            Ok(_) => Err(GatewayError::OrchestratorError {
                status: 200,
                body: "provision returned no workers".to_string(),
            }),
            Err(err) => {
                // permit is dropped here, returning the seat to the pool.
                drop(permit);
                Err(err)
            }
        }
    }

    /// Pre-warm: adopt extra workers `provision` handed back beyond the one
    /// requested, straight into the idle queue (like `adopt`, this does not
    /// touch the semaphore — idle workers hold no permit). Bounded by `N`
    /// total live workers; anything beyond that is logged, never silently
    /// dropped, since the orchestrator should not hand back more than `N`
    /// workers for an `N`-capacity pool.
    fn adopt_prewarm_extras(&self, extras: Vec<Worker>) {
        let max = self.config.max_capacity.max(1);
        for worker in extras {
            let mut state = self.state.lock().expect("pool mutex poisoned");
            if state.all.len() < max {
                state.all.push(worker.clone());
                state.idle.push_back(IdleEntry {
                    worker,
                    went_idle_at: Instant::now(),
                });
            } else {
                warn!(
                    function = %self.function,
                    worker = %worker.id,
                    "provision pre-warmed more workers than pool capacity allows; discarding extra"
                );
            }
        }
    }

    /// Return a worker to the idle queue, releasing one permit.
    pub fn release(&self, lease: Lease) {
        let mut worker = lease.worker;
        worker.touch();
        self.push_idle(worker);
        drop(lease.permit);
    }

    /// Remove a worker permanently (known-unhealthy), releasing one permit
    /// without returning it to the idle queue.
    pub fn evict(&self, lease: Lease) {
        let mut state = self.state.lock().expect("pool mutex poisoned");
        state.all.retain(|w| w.id != lease.worker.id);
        drop(state);
        drop(lease.permit);
    }

    /// Insert an already-running worker discovered at startup or via
    /// reconciliation. Does not touch the semaphore: the seat already
    /// exists logically (the orchestrator is already running the
    /// container), it is merely being re-attached to this pool's
    /// bookkeeping. Callers are expected to have reserved capacity for
    /// adopted workers out-of-band (e.g. at construction time).
    pub fn adopt(&self, mut worker: Worker) {
        worker.touch();
        self.register(worker.clone());
        self.push_idle(worker);
    }

    /// Remove every idle worker whose idle time exceeds `idle_timeout`.
    /// Deliberately does not touch the semaphore: an idle worker already
    /// returned its permit when `release` enqueued it, so pruning reduces
    /// `|all|` and `|idle|` equally without changing `permits`.
    pub fn prune(&self, idle_timeout: Duration) -> Vec<Worker> {
        let mut state = self.state.lock().expect("pool mutex poisoned");
        let mut pruned = Vec::new();
        let mut survivors = VecDeque::with_capacity(state.idle.len());
        while let Some(entry) = state.idle.pop_front() {
            if entry.went_idle_at.elapsed() > idle_timeout {
                pruned.push(entry.worker);
            } else {
                survivors.push_back(entry);
            }
        }
        state.idle = survivors;
        let pruned_ids: std::collections::HashSet<_> = pruned.iter().map(|w| w.id.clone()).collect();
        state.all.retain(|w| !pruned_ids.contains(&w.id));
        pruned
    }

    /// Atomically take every worker, clearing both structures.
    pub fn drain(&self) -> Vec<Worker> {
        let mut state = self.state.lock().expect("pool mutex poisoned");
        let drained = std::mem::take(&mut state.all);
        state.idle.clear();
        drained
    }

    /// Snapshot of every live worker's name, for heartbeat reporting. Reads
    /// the all-set (busy ∪ idle), not just idle, so a worker released after
    /// this snapshot is taken but before the heartbeat ships is still
    /// reported as live.
    pub fn names(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("pool mutex poisoned")
            .all
            .iter()
            .map(|w| w.name.clone())
            .collect()
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().expect("pool mutex poisoned").idle.len()
    }

    pub fn all_count(&self) -> usize {
        self.state.lock().expect("pool mutex poisoned").all.len()
    }

    fn pop_idle(&self) -> Option<Worker> {
        self.state
            .lock()
            .expect("pool mutex poisoned")
            .idle
            .pop_back()
            .map(|entry| entry.worker)
    }

    fn push_idle(&self, worker: Worker) {
        self.state.lock().expect("pool mutex poisoned").idle.push_back(IdleEntry {
            worker,
            went_idle_at: Instant::now(),
        });
    }

    fn register(&self, worker: Worker) {
        let mut state = self.state.lock().expect("pool mutex poisoned");
        if !state.all.iter().any(|w| w.id == worker.id) {
            state.all.push(worker);
        }
    }
}
