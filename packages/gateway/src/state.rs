//! Shared application state handed to every axum handler.

use std::sync::Arc;

use dashmap::DashMap;
use gateway_core::breaker::CircuitBreaker;
use gateway_core::cache::HostCache;
use gateway_core::config::{FunctionRegistry, GatewaySettings, RouteTable};
use gateway_core::metrics::Metrics;
use gateway_core::pool::{PoolConfig, PoolManager};
use orchestrator_client::OrchestratorClient;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<GatewaySettings>,
    pub functions: Arc<FunctionRegistry>,
    pub routes: Arc<RouteTable>,
    pub pools: Arc<PoolManager>,
    pub orchestrator: Arc<OrchestratorClient>,
    pub cache: Arc<HostCache>,
    pub metrics: Arc<Metrics>,
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
}

impl AppState {
    pub fn new(settings: GatewaySettings, functions: FunctionRegistry, routes: RouteTable) -> Self {
        let settings = Arc::new(settings);
        let metrics = Arc::new(Metrics::new());

        let pool_config = PoolConfig {
            max_capacity: settings.pool_max,
            min_capacity: settings.pool_min,
            acquire_timeout: settings.acquire_timeout(),
        };
        let pools = Arc::new(PoolManager::with_default_config(pool_config));

        let orchestrator =
            Arc::new(OrchestratorClient::new(settings.orchestrator_url.clone()).with_metrics(metrics.clone()));
        let cache = Arc::new(HostCache::new(settings.cache_size, settings.cache_ttl()));

        Self {
            functions: Arc::new(functions),
            routes: Arc::new(routes),
            pools,
            orchestrator,
            cache,
            metrics,
            breakers: Arc::new(DashMap::new()),
            settings,
        }
    }

    /// Per-function circuit breaker, created lazily on first use with the
    /// process-wide threshold/recovery-window settings.
    pub fn breaker_for(&self, function: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(function) {
            return breaker.clone();
        }
        self.breakers
            .entry(function.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    function,
                    self.settings.breaker_threshold,
                    self.settings.breaker_recovery_window(),
                ))
            })
            .clone()
    }

    pub fn breaker_states(&self) -> Vec<(String, gateway_core::breaker::CircuitBreakerState)> {
        self.breakers.iter().map(|entry| (entry.key().clone(), entry.value().state())).collect()
    }
}
