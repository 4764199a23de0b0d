//! Prometheus metrics shared across the pool manager, breakers, invoker and
//! janitor. Built once at startup and handed around behind an `Arc`.

use prometheus::{Encoder, HistogramVec, IntCounterVec, IntGaugeVec, Registry, TextEncoder, opts};

use crate::breaker::CircuitBreakerState;

pub struct Metrics {
    registry: Registry,
    pub pool_permits_available: IntGaugeVec,
    pub pool_workers_total: IntGaugeVec,
    pub pool_workers_idle: IntGaugeVec,
    pub breaker_state: IntGaugeVec,
    pub invocations_total: IntCounterVec,
    pub invocation_duration_seconds: HistogramVec,
    pub orchestrator_requests_total: IntCounterVec,
    pub host_cache_hits_total: IntCounterVec,
    pub host_cache_misses_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let pool_permits_available =
            IntGaugeVec::new(opts!("pool_permits_available", "Free semaphore permits per function"), &["function"])
                .expect("metric registration");
        let pool_workers_total =
            IntGaugeVec::new(opts!("pool_workers_total", "Live workers per function"), &["function"])
                .expect("metric registration");
        let pool_workers_idle =
            IntGaugeVec::new(opts!("pool_workers_idle", "Idle workers per function"), &["function"])
                .expect("metric registration");
        let breaker_state = IntGaugeVec::new(
            opts!("breaker_state", "Circuit breaker state per function (0=closed, 1=half-open, 2=open)"),
            &["function"],
        )
        .expect("metric registration");
        let invocations_total = IntCounterVec::new(
            opts!("invocations_total", "Invocations per function by outcome"),
            &["function", "outcome"],
        )
        .expect("metric registration");
        let invocation_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("invocation_duration_seconds", "Invocation latency per function"),
            &["function"],
        )
        .expect("metric registration");
        let orchestrator_requests_total = IntCounterVec::new(
            opts!("orchestrator_requests_total", "Orchestrator client calls by operation and outcome"),
            &["op", "outcome"],
        )
        .expect("metric registration");
        let host_cache_hits_total =
            IntCounterVec::new(opts!("host_cache_hits_total", "Host cache hits"), &["function"])
                .expect("metric registration");
        let host_cache_misses_total =
            IntCounterVec::new(opts!("host_cache_misses_total", "Host cache misses"), &["function"])
                .expect("metric registration");

        for collector in [
            Box::new(pool_permits_available.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(pool_workers_total.clone()),
            Box::new(pool_workers_idle.clone()),
            Box::new(breaker_state.clone()),
            Box::new(invocations_total.clone()),
            Box::new(invocation_duration_seconds.clone()),
            Box::new(orchestrator_requests_total.clone()),
            Box::new(host_cache_hits_total.clone()),
            Box::new(host_cache_misses_total.clone()),
        ] {
            registry.register(collector).expect("metric registration");
        }

        Self {
            registry,
            pool_permits_available,
            pool_workers_total,
            pool_workers_idle,
            breaker_state,
            invocations_total,
            invocation_duration_seconds,
            orchestrator_requests_total,
            host_cache_hits_total,
            host_cache_misses_total,
        }
    }

    pub fn record_pool_snapshot(&self, function: &str, permits: i64, total: i64, idle: i64) {
        self.pool_permits_available.with_label_values(&[function]).set(permits);
        self.pool_workers_total.with_label_values(&[function]).set(total);
        self.pool_workers_idle.with_label_values(&[function]).set(idle);
    }

    pub fn record_breaker_state(&self, function: &str, state: CircuitBreakerState) {
        let value = match state {
            CircuitBreakerState::Closed => 0,
            CircuitBreakerState::HalfOpen => 1,
            CircuitBreakerState::Open => 2,
        };
        self.breaker_state.with_label_values(&[function]).set(value);
    }

    pub fn record_invocation(&self, function: &str, outcome: &str, duration_secs: f64) {
        self.invocations_total.with_label_values(&[function, outcome]).inc();
        self.invocation_duration_seconds.with_label_values(&[function]).observe(duration_secs);
    }

    pub fn record_orchestrator_request(&self, op: &str, outcome: &str) {
        self.orchestrator_requests_total.with_label_values(&[op, outcome]).inc();
    }

    pub fn record_cache_hit(&self, function: &str) {
        self.host_cache_hits_total.with_label_values(&[function]).inc();
    }

    pub fn record_cache_miss(&self, function: &str) {
        self.host_cache_misses_total.with_label_values(&[function]).inc();
    }

    /// Render the registry in Prometheus text exposition format, for
    /// `GET /metrics`.
    pub fn render(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .expect("prometheus text encoding");
        String::from_utf8(buffer).expect("prometheus output is valid utf-8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
