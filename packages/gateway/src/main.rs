use std::sync::Arc;

use gateway::api::router;
use gateway::janitor::HeartbeatJanitor;
use gateway::state::AppState;
use gateway_core::config::{FunctionRegistry, GatewaySettings, LogFormat, RouteTable};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_tracing();

    let settings = match GatewaySettings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            tracing::error!(error = %err, "failed to load gateway settings");
            std::process::exit(1);
        }
    };

    let functions = match FunctionRegistry::load(&settings.functions_file) {
        Ok(functions) => functions,
        Err(err) => {
            tracing::error!(error = %err, "failed to load function registry");
            std::process::exit(1);
        }
    };

    let routes = match RouteTable::load(&settings.routes_file, &functions) {
        Ok(routes) => routes,
        Err(err) => {
            tracing::error!(error = %err, "failed to load route table");
            std::process::exit(1);
        }
    };

    let bind_addr = settings.bind_addr.clone();
    let heartbeat_interval = settings.heartbeat_interval();
    let idle_timeout = settings.idle_timeout();

    let state = AppState::new(settings, functions, routes);
    adopt_existing_workers(&state).await;
    let janitor = HeartbeatJanitor::spawn(Arc::new(state.clone()), heartbeat_interval, idle_timeout);

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|err| panic!("failed to bind {bind_addr}: {err}"));
    tracing::info!(addr = %bind_addr, "gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("gateway server exited");

    janitor.stop().await;
}

/// Waits for Ctrl+C or, on Unix, SIGTERM, so `axum::serve` returns and the
/// janitor gets a chance to drain instead of being killed mid-tick.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// `GATEWAY_LOG_FORMAT` is read directly here (ahead of the full
/// `GatewaySettings::from_env` call) because the global tracing subscriber
/// can only be installed once, and we want `ConfigError`s from settings
/// loading itself to come out formatted the same way as everything else.
fn init_tracing() {
    let json = std::env::var("GATEWAY_LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    let format = if json { LogFormat::Json } else { LogFormat::Pretty };
    let builder = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env());
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Bind any containers the Orchestrator already has running into this
/// fresh process's pool bookkeeping, so a gateway restart does not strand
/// live containers as unreachable orphans nor force a needless cold start
/// on the first request after restart. Best-effort: a failure here just
/// means the first invocation per function re-provisions as normal.
async fn adopt_existing_workers(state: &gateway::state::AppState) {
    let trace_id = gateway_core::trace::generate();
    match state.orchestrator.list(&trace_id).await {
        Ok(workers) => {
            let count = workers.len();
            for worker in workers {
                let function = worker.function_name().to_string();
                state.pools.adopt(&function, worker);
            }
            tracing::info!(count, "adopted pre-existing workers from orchestrator");
        }
        Err(err) => {
            tracing::warn!(error = %err, "could not list existing workers at startup; continuing without adoption");
        }
    }
}
