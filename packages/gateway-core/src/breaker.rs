//! Per-function circuit breaker with CLOSED/OPEN/HALF_OPEN transitions.
//!
//! HALF_OPEN admits exactly one probe: a failed probe instantly re-opens the
//! circuit instead of counting back up to the threshold, which would let a
//! flapping backend thrash between states.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitBreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Error returned by [`CircuitBreaker::call`]: either the breaker rejected
/// the call outright, or the wrapped operation itself failed.
#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    Open,
    Inner(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "circuit breaker open"),
            Self::Inner(e) => write!(f, "{e}"),
        }
    }
}

pub struct CircuitBreaker {
    label: String,
    threshold: u32,
    recovery_window: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(label: impl Into<String>, threshold: u32, recovery_window: Duration) -> Self {
        Self {
            label: label.into(),
            threshold,
            recovery_window,
            inner: Mutex::new(Inner {
                state: CircuitBreakerState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitBreakerState {
        self.inner.lock().expect("breaker mutex poisoned").state
    }

    /// Run `operation` through the breaker. No lock is held across the
    /// `.await` of `operation` itself — only around the state transitions
    /// before and after it.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.admit() {
            return Err(CircuitBreakerError::Open);
        }

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    /// Decide whether a call may proceed, performing the OPEN→HALF_OPEN
    /// transition if the recovery window has elapsed.
    fn admit(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.state {
            CircuitBreakerState::Closed | CircuitBreakerState::HalfOpen => true,
            CircuitBreakerState::Open => {
                let elapsed = inner.last_failure.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                if elapsed > self.recovery_window {
                    inner.state = CircuitBreakerState::HalfOpen;
                    info!(function = %self.label, "circuit breaker half-open, admitting probe");
                    true
                } else {
                    false
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        if inner.state != CircuitBreakerState::Closed {
            info!(function = %self.label, "circuit breaker closed after successful probe");
        }
        inner.state = CircuitBreakerState::Closed;
        inner.failure_count = 0;
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        match inner.state {
            CircuitBreakerState::HalfOpen => {
                inner.state = CircuitBreakerState::Open;
                warn!(function = %self.label, "probe failed, circuit breaker re-opened");
            }
            CircuitBreakerState::Closed if inner.failure_count >= self.threshold => {
                inner.state = CircuitBreakerState::Open;
                warn!(
                    function = %self.label,
                    failures = inner.failure_count,
                    "failure threshold reached, circuit breaker opened"
                );
            }
            _ => {}
        }
    }
}
