//! End-to-end scenarios driving the real gateway router against a real
//! Orchestrator router (backed by an in-memory [`TestRuntime`]) and a
//! minimal fake RIE, all bound to ephemeral ports and spoken to over HTTP
//! exactly the way a deployed gateway and orchestrator would talk to each
//! other and to a real Lambda Runtime Interface Emulator.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use gateway::janitor::HeartbeatJanitor;
use gateway::state::AppState;
use gateway_core::config::{FunctionConfig, FunctionRegistry, GatewaySettings, LogFormat, RouteTable};
use gateway_core::error::GatewayError;
use gateway_core::worker::Worker;
use orchestrator::OrchestratorService;
use orchestrator::runtime::{ContainerRuntime, RuntimeContainer};
use reqwest::Client;
use serde_json::{Value, json};
use tokio::net::TcpListener;

// ---------------------------------------------------------------------
// Fake RIE: a tiny axum app standing in for the Lambda Runtime Interface
// Emulator a real container would run.
// ---------------------------------------------------------------------

#[derive(Clone)]
struct RieState {
    status: Arc<AtomicU16>,
    sleep_ms: Arc<AtomicU64>,
    calls: Arc<AtomicUsize>,
    concurrent: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

async fn rie_handler(State(state): State<RieState>) -> impl IntoResponse {
    state.calls.fetch_add(1, Ordering::SeqCst);
    let concurrent = state.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
    state.peak.fetch_max(concurrent, Ordering::SeqCst);

    let sleep_ms = state.sleep_ms.load(Ordering::SeqCst);
    if sleep_ms > 0 {
        tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
    }

    state.concurrent.fetch_sub(1, Ordering::SeqCst);
    let status = StatusCode::from_u16(state.status.load(Ordering::SeqCst)).unwrap_or(StatusCode::OK);
    (status, Json(json!({ "ok": true })))
}

struct FakeRie {
    addr: SocketAddr,
    state: RieState,
    handle: tokio::task::JoinHandle<()>,
}

impl FakeRie {
    fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    fn peak_concurrent(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }

    fn set_status(&self, status: u16) {
        self.state.status.store(status, Ordering::SeqCst);
    }

    /// Close the listening socket to simulate a container whose RIE has
    /// crashed or become unreachable: the next connection attempt against
    /// `addr` fails with a connection error.
    async fn kill(self) {
        self.handle.abort();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn spawn_fake_rie(status: u16, sleep_ms: u64) -> FakeRie {
    let state = RieState {
        status: Arc::new(AtomicU16::new(status)),
        sleep_ms: Arc::new(AtomicU64::new(sleep_ms)),
        calls: Arc::new(AtomicUsize::new(0)),
        concurrent: Arc::new(AtomicUsize::new(0)),
        peak: Arc::new(AtomicUsize::new(0)),
    };
    let app = Router::new()
        .route("/2015-03-31/functions/function/invocations", post(rie_handler))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    FakeRie { addr, state, handle }
}

// ---------------------------------------------------------------------
// TestRuntime: a ContainerRuntime that hands every provisioned container
// the address of whichever fake RIE is currently "plugged in", so tests
// can swap the backing RIE out from under the orchestrator mid-scenario.
// ---------------------------------------------------------------------

struct TestRuntime {
    containers: Mutex<HashMap<String, RuntimeContainer>>,
    endpoint: Mutex<SocketAddr>,
    ensure_running_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl TestRuntime {
    fn new(endpoint: SocketAddr) -> Self {
        Self {
            containers: Mutex::new(HashMap::new()),
            endpoint: Mutex::new(endpoint),
            ensure_running_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        }
    }

    fn set_endpoint(&self, endpoint: SocketAddr) {
        *self.endpoint.lock().unwrap() = endpoint;
    }

    fn ensure_running_calls(&self) -> usize {
        self.ensure_running_calls.load(Ordering::SeqCst)
    }

    fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for TestRuntime {
    async fn ensure_running(
        &self,
        name: &str,
        _image: Option<&str>,
        _env: &HashMap<String, String>,
        _network: &str,
    ) -> Result<RuntimeContainer, GatewayError> {
        self.ensure_running_calls.fetch_add(1, Ordering::SeqCst);
        let endpoint = *self.endpoint.lock().unwrap();
        let container = RuntimeContainer {
            id: format!("rt-{name}"),
            name: name.to_string(),
            ip_address: endpoint.ip().to_string(),
            port: endpoint.port(),
        };
        self.containers.lock().unwrap().insert(name.to_string(), container.clone());
        Ok(container)
    }

    async fn wait_ready(&self, _container: &RuntimeContainer, _timeout: Duration) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<(), GatewayError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.containers.lock().unwrap().retain(|_, c| c.id != id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Worker>, GatewayError> {
        Ok(self
            .containers
            .lock()
            .unwrap()
            .values()
            .map(|c| Worker::new(c.id.clone(), c.name.clone(), c.ip_address.clone(), c.port))
            .collect())
    }
}

// ---------------------------------------------------------------------
// Harness: spin up a real orchestrator router and a real gateway router,
// each bound to its own ephemeral port, wired together over HTTP.
// ---------------------------------------------------------------------

struct TestOrchestrator {
    base_url: String,
    service: Arc<OrchestratorService>,
}

async fn spawn_orchestrator(runtime: Arc<TestRuntime>, grace_period: Duration) -> TestOrchestrator {
    let service = Arc::new(OrchestratorService::new(runtime, "test-net", Duration::from_secs(5)));
    let state = orchestrator::api::AppState { service: service.clone(), grace_period };
    let app = orchestrator::api::router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestOrchestrator { base_url: format!("http://{addr}"), service }
}

fn test_settings(orchestrator_url: &str, pool_max: usize, idle_timeout_secs: u64, breaker_threshold: u32, breaker_recovery_secs: u64) -> GatewaySettings {
    GatewaySettings {
        bind_addr: "127.0.0.1:0".to_string(),
        auth_username: "admin".to_string(),
        auth_password: "admin".to_string(),
        auth_api_key: "test-api-key".to_string(),
        jwt_secret: "a-test-secret-that-is-at-least-32-characters-long".to_string(),
        jwt_ttl_secs: 3600,
        routes_file: String::new(),
        functions_file: String::new(),
        orchestrator_url: orchestrator_url.to_string(),
        cache_ttl_secs: 300,
        cache_size: 256,
        pool_max,
        pool_min: 0,
        acquire_timeout_secs: 10,
        idle_timeout_secs,
        breaker_threshold,
        breaker_recovery_secs,
        heartbeat_interval_secs: 30,
        grace_period_secs: 60,
        log_format: LogFormat::Pretty,
    }
}

fn functions_with(names: &[&str]) -> FunctionRegistry {
    let map = names
        .iter()
        .map(|n| (n.to_string(), FunctionConfig { name: n.to_string(), image: None, environment: HashMap::new() }))
        .collect();
    FunctionRegistry::load_from_map(map)
}

async fn spawn_gateway(settings: GatewaySettings, functions: FunctionRegistry) -> (AppState, String) {
    let state = AppState::new(settings, functions, RouteTable::empty());
    let app = gateway::api::router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (state, format!("http://{addr}"))
}

async fn get_token(client: &Client, base_url: &str) -> String {
    let response = client
        .post(format!("{base_url}/auth"))
        .header("x-api-key", "test-api-key")
        .json(&json!({ "AuthParameters": { "USERNAME": "admin", "PASSWORD": "admin" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    body["AuthenticationResult"]["IdToken"].as_str().unwrap().to_string()
}

async fn invoke(client: &Client, base_url: &str, token: &str, function: &str) -> reqwest::Response {
    client
        .post(format!("{base_url}/2015-03-31/functions/{function}/invocations"))
        .bearer_auth(token)
        .json(&json!({ "k": "v" }))
        .send()
        .await
        .unwrap()
}

// ---------------------------------------------------------------------
// Scenario 1: cold start + warm reuse.
// ---------------------------------------------------------------------

#[tokio::test]
async fn cold_start_then_warm_reuse() {
    let rie = spawn_fake_rie(200, 0).await;
    let runtime = Arc::new(TestRuntime::new(rie.addr));
    let orch = spawn_orchestrator(runtime.clone(), Duration::from_secs(60)).await;
    let settings = test_settings(&orch.base_url, 1, 300, 5, 30);
    let (_state, base_url) = spawn_gateway(settings, functions_with(&["echo"])).await;

    let client = Client::new();
    let token = get_token(&client, &base_url).await;

    let first = invoke(&client, &base_url, &token, "echo").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(runtime.ensure_running_calls(), 1);

    let second = invoke(&client, &base_url, &token, "echo").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(runtime.ensure_running_calls(), 1, "second invoke must reuse the warm worker, not provision again");
}

// ---------------------------------------------------------------------
// Scenario 2: grace-period adoption across a gateway restart.
// ---------------------------------------------------------------------

#[tokio::test]
async fn grace_period_adoption_survives_gateway_restart() {
    let rie = spawn_fake_rie(200, 0).await;
    let runtime = Arc::new(TestRuntime::new(rie.addr));
    let orch = spawn_orchestrator(runtime.clone(), Duration::from_secs(60)).await;
    let client = Client::new();

    let settings1 = test_settings(&orch.base_url, 1, 300, 5, 30);
    let (_state1, base_url1) = spawn_gateway(settings1, functions_with(&["echo"])).await;
    let token1 = get_token(&client, &base_url1).await;
    let first = invoke(&client, &base_url1, &token1, "echo").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(runtime.ensure_running_calls(), 1);

    // Simulate a gateway restart: a brand new AppState, pointed at the same
    // orchestrator, adopts whatever the orchestrator already has running
    // instead of starting from empty pools.
    let settings2 = test_settings(&orch.base_url, 1, 300, 5, 30);
    let state2 = AppState::new(settings2, functions_with(&["echo"]), RouteTable::empty());
    let trace_id = gateway_core::trace::generate();
    for worker in state2.orchestrator.list(&trace_id).await.unwrap() {
        let function = worker.function_name().to_string();
        state2.pools.adopt(&function, worker);
    }
    let app2 = gateway::api::router(state2.clone());
    let listener2 = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr2 = listener2.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener2, app2).await;
    });
    let base_url2 = format!("http://{addr2}");
    let token2 = get_token(&client, &base_url2).await;

    let second = invoke(&client, &base_url2, &token2, "echo").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(runtime.ensure_running_calls(), 1, "restart must not re-provision a fresh container");

    // A heartbeat reporting no names is still within the grace period, so
    // reconciliation must spare the adopted container.
    orch.service.reconcile("echo", &[], Duration::from_secs(3600)).await;
    assert_eq!(orch.service.list().await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------
// Scenario 3: circuit breaker opens after the failure threshold, then
// recovers once the backend becomes healthy again.
// ---------------------------------------------------------------------

#[tokio::test]
async fn circuit_breaker_opens_after_threshold_and_recovers() {
    let rie = spawn_fake_rie(500, 0).await;
    let runtime = Arc::new(TestRuntime::new(rie.addr));
    let orch = spawn_orchestrator(runtime.clone(), Duration::from_secs(60)).await;
    let settings = test_settings(&orch.base_url, 1, 300, 2, 1);
    let (_state, base_url) = spawn_gateway(settings, functions_with(&["bad"])).await;

    let client = Client::new();
    let token = get_token(&client, &base_url).await;

    for _ in 0..2 {
        let response = invoke(&client, &base_url, &token, "bad").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
    assert_eq!(rie.calls(), 2);

    let tripped = invoke(&client, &base_url, &token, "bad").await;
    assert_eq!(tripped.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = tripped.json().await.unwrap();
    assert_eq!(body["message"], "Circuit Breaker Open");
    assert_eq!(rie.calls(), 2, "the breaker must short-circuit before a third RIE call is attempted");

    rie.set_status(200);
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let recovered = invoke(&client, &base_url, &token, "bad").await;
    assert_eq!(recovered.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------
// Scenario 4: self-healing after the RIE becomes unreachable.
// ---------------------------------------------------------------------

#[tokio::test]
async fn self_healing_on_rie_connection_failure() {
    let rie1 = spawn_fake_rie(200, 0).await;
    let runtime = Arc::new(TestRuntime::new(rie1.addr));
    let orch = spawn_orchestrator(runtime.clone(), Duration::from_secs(60)).await;
    let settings = test_settings(&orch.base_url, 1, 300, 5, 30);
    let (_state, base_url) = spawn_gateway(settings, functions_with(&["echo"])).await;

    let client = Client::new();
    let token = get_token(&client, &base_url).await;

    let first = invoke(&client, &base_url, &token, "echo").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(runtime.ensure_running_calls(), 1);

    rie1.kill().await;

    let second = invoke(&client, &base_url, &token, "echo").await;
    assert_eq!(second.status(), StatusCode::BAD_GATEWAY);

    let rie2 = spawn_fake_rie(200, 0).await;
    runtime.set_endpoint(rie2.addr);

    let third = invoke(&client, &base_url, &token, "echo").await;
    assert_eq!(third.status(), StatusCode::OK);
    assert_eq!(runtime.ensure_running_calls(), 2, "the evicted worker must be replaced by a freshly provisioned one");
}

// ---------------------------------------------------------------------
// Scenario 5: bounded concurrency queues excess requests instead of
// exceeding the pool's capacity.
// ---------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bounded_concurrency_queues_excess_requests() {
    let rie = spawn_fake_rie(200, 1000).await;
    let runtime = Arc::new(TestRuntime::new(rie.addr));
    let orch = spawn_orchestrator(runtime.clone(), Duration::from_secs(60)).await;
    let settings = test_settings(&orch.base_url, 2, 300, 5, 30);
    let (_state, base_url) = spawn_gateway(settings, functions_with(&["slow"])).await;

    let client = Client::new();
    let token = get_token(&client, &base_url).await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let client = client.clone();
        let base_url = base_url.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move { invoke(&client, &base_url, &token, "slow").await.status() }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert!(runtime.ensure_running_calls() <= 2, "at most N containers should ever be provisioned for N-bounded concurrency");
    assert_eq!(rie.peak_concurrent(), 2, "the pool must bound concurrent RIE calls to its capacity");
}

// ---------------------------------------------------------------------
// Scenario 6: idle pruning sweeps expired workers on the janitor's tick
// and reports an empty heartbeat for the function afterward.
// ---------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn idle_pruning_via_janitor_tick() {
    let rie = spawn_fake_rie(200, 0).await;
    let runtime = Arc::new(TestRuntime::new(rie.addr));
    let orch = spawn_orchestrator(runtime.clone(), Duration::from_secs(60)).await;
    let settings = test_settings(&orch.base_url, 3, 0, 5, 30);
    let (state, base_url) = spawn_gateway(settings, functions_with(&["x"])).await;

    let client = Client::new();
    let token = get_token(&client, &base_url).await;

    let mut handles = Vec::new();
    for _ in 0..3 {
        let client = client.clone();
        let base_url = base_url.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move { invoke(&client, &base_url, &token, "x").await.status() }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }
    assert_eq!(state.pools.all_worker_names().get("x").map(|v| v.len()), Some(3));

    tokio::time::sleep(Duration::from_millis(50)).await;

    let janitor = HeartbeatJanitor::spawn(Arc::new(state.clone()), Duration::from_millis(20), Duration::from_millis(0));
    tokio::time::sleep(Duration::from_millis(150)).await;
    janitor.stop().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(state.pools.all_worker_names().get("x").is_none(), "a fully pruned function must vanish from the heartbeat snapshot");
    assert_eq!(runtime.stop_calls(), 3, "every pruned worker must have been deleted via the orchestrator");
}
