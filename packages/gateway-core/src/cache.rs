//! TTL + LRU mapping from function name to the last known worker that served
//! it.
//!
//! The cache backs the invoker's fast path: on an idle-queue miss, a hit here
//! lets `LambdaInvoker` retry the same container instead of round-tripping
//! through the Orchestrator. A stale or dead entry is not a correctness
//! problem — the first request against it fails with a connection error,
//! which evicts the worker and invalidates the entry same as any other
//! unhealthy worker.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::worker::Worker;

struct Entry {
    worker: Worker,
    inserted_at: Instant,
}

struct Inner {
    entries: HashMap<String, Entry>,
    /// Most-recently-used at the back.
    order: Vec<String>,
}

/// Bounded TTL+LRU cache from function name to its last known worker endpoint.
pub struct HostCache {
    inner: Mutex<Inner>,
    max_size: usize,
    ttl: Duration,
}

impl HostCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: Vec::new(),
            }),
            max_size,
            ttl,
        }
    }

    /// Returns the cached worker if present and not TTL-expired, promoting
    /// it to most-recently-used on a hit.
    pub fn get(&self, key: &str) -> Option<Worker> {
        let mut inner = self.inner.lock().expect("host cache mutex poisoned");
        let expired = match inner.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => return None,
        };
        if expired {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            trace!(function = key, "host cache entry expired");
            return None;
        }
        touch(&mut inner.order, key);
        inner.entries.get(key).map(|e| e.worker.clone())
    }

    /// Inserts or refreshes an entry, evicting the least-recently-used entry
    /// if this insertion would exceed `max_size`.
    pub fn set(&self, key: &str, worker: Worker) {
        let mut inner = self.inner.lock().expect("host cache mutex poisoned");
        let is_new = !inner.entries.contains_key(key);
        inner.entries.insert(
            key.to_string(),
            Entry {
                worker,
                inserted_at: Instant::now(),
            },
        );
        touch(&mut inner.order, key);

        if is_new && inner.order.len() > self.max_size {
            if let Some(lru_key) = first_non_current(&inner.order, key) {
                inner.entries.remove(&lru_key);
                inner.order.retain(|k| k != &lru_key);
                trace!(evicted = lru_key.as_str(), "host cache evicted LRU entry");
            }
        }
    }

    pub fn invalidate(&self, key: &str) {
        let mut inner = self.inner.lock().expect("host cache mutex poisoned");
        inner.entries.remove(key);
        inner.order.retain(|k| k != key);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("host cache mutex poisoned");
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("host cache mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn touch(order: &mut Vec<String>, key: &str) {
    order.retain(|k| k != key);
    order.push(key.to_string());
}

fn first_non_current(order: &[String], current: &str) -> Option<String> {
    order.iter().find(|k| k.as_str() != current).cloned()
}
