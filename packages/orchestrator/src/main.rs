use std::sync::Arc;
use std::time::Duration;

use orchestrator::api::{AppState, router};
use orchestrator::runtime::DockerRuntime;
use orchestrator::{OrchestratorService, OrchestratorSettings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let settings = match OrchestratorSettings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            tracing::error!(error = %err, "failed to load orchestrator settings");
            std::process::exit(1);
        }
    };

    let runtime = match DockerRuntime::connect() {
        Ok(runtime) => Arc::new(runtime),
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to the container runtime");
            std::process::exit(1);
        }
    };

    let service = Arc::new(OrchestratorService::new(
        runtime,
        settings.docker_network.clone(),
        Duration::from_secs(settings.cold_start_timeout_secs),
    ));

    let state = AppState { service, grace_period: Duration::from_secs(settings.grace_period_secs) };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .unwrap_or_else(|err| panic!("failed to bind {}: {err}", settings.bind_addr));
    tracing::info!(addr = %settings.bind_addr, "orchestrator listening");
    axum::serve(listener, app).await.expect("orchestrator server exited");
}
