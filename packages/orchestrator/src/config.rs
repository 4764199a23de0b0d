//! Orchestrator process settings, read once at startup.

use gateway_core::error::GatewayError;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub bind_addr: String,
    pub docker_network: String,
    pub cold_start_timeout_secs: u64,
    pub grace_period_secs: u64,
}

impl OrchestratorSettings {
    pub fn from_env() -> Result<Self, GatewayError> {
        Ok(Self {
            bind_addr: env_var("ORCHESTRATOR_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:9090".to_string()),
            docker_network: env_var("ORCHESTRATOR_DOCKER_NETWORK").unwrap_or_else(|| "bridge".to_string()),
            cold_start_timeout_secs: env_parse("ORCHESTRATOR_COLD_START_TIMEOUT_SECS", 30),
            grace_period_secs: env_parse("ORCHESTRATOR_GRACE_PERIOD_SECS", 60),
        })
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_var(name).and_then(|s| s.parse().ok()).unwrap_or(default)
}
