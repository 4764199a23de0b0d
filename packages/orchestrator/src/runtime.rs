//! The container runtime abstraction. `DockerRuntime` drives the real Docker
//! Engine API via `bollard`; `FakeRuntime` stands in for it in tests so the
//! integration suite never needs a real Docker daemon.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::models::ContainerSummary;
use gateway_core::error::GatewayError;
use gateway_core::worker::Worker;
use tracing::{info, warn};

/// A single running container, freshly created, not yet probed for
/// readiness. `ensure_running` returns this; the caller probes the RIE
/// endpoint before handing the worker back to a pool.
#[derive(Debug, Clone)]
pub struct RuntimeContainer {
    pub id: String,
    pub name: String,
    pub ip_address: String,
    pub port: u16,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create `name` on `network` if it does not already exist and is not
    /// already running; return its id/endpoint either way.
    async fn ensure_running(
        &self,
        name: &str,
        image: Option<&str>,
        env: &HashMap<String, String>,
        network: &str,
    ) -> Result<RuntimeContainer, GatewayError>;

    /// Probe the RIE invocations endpoint until it answers or `timeout` elapses.
    async fn wait_ready(&self, container: &RuntimeContainer, timeout: Duration) -> Result<(), GatewayError>;

    async fn stop(&self, id: &str) -> Result<(), GatewayError>;

    /// All containers this runtime manages, regardless of function.
    async fn list(&self) -> Result<Vec<Worker>, GatewayError>;
}

const RIE_PORT: u16 = 8080;
const FUNCTION_LABEL: &str = "lambda-emulator.function";

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self, GatewayError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| GatewayError::RuntimeUnreachable(e.to_string()))?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ensure_running(
        &self,
        name: &str,
        image: Option<&str>,
        env: &HashMap<String, String>,
        network: &str,
    ) -> Result<RuntimeContainer, GatewayError> {
        if let Ok(inspected) = self.docker.inspect_container(name, None).await {
            let running = inspected.state.as_ref().and_then(|s| s.running).unwrap_or(false);
            if running {
                let ip_address = inspected
                    .network_settings
                    .as_ref()
                    .and_then(|ns| ns.networks.as_ref())
                    .and_then(|nets| nets.get(network))
                    .and_then(|n| n.ip_address.clone())
                    .unwrap_or_else(|| "127.0.0.1".to_string());
                let id = inspected.id.unwrap_or_else(|| name.to_string());
                return Ok(RuntimeContainer { id, name: name.to_string(), ip_address, port: RIE_PORT });
            }
        }

        let env_pairs: Vec<String> = env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let config = Config {
            image: image.map(str::to_string),
            env: Some(env_pairs),
            labels: Some(HashMap::from([(FUNCTION_LABEL.to_string(), function_label_value(name))])),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(Some(CreateContainerOptions { name: name.to_string(), platform: None }), config)
            .await
            .map_err(|e| GatewayError::RuntimeUnreachable(e.to_string()))?;

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| GatewayError::RuntimeUnreachable(e.to_string()))?;

        let inspected = self
            .docker
            .inspect_container(&created.id, None)
            .await
            .map_err(|e| GatewayError::RuntimeUnreachable(e.to_string()))?;
        let ip_address = inspected
            .network_settings
            .and_then(|ns| ns.networks)
            .and_then(|mut nets| nets.remove(network))
            .and_then(|n| n.ip_address)
            .unwrap_or_else(|| "127.0.0.1".to_string());

        info!(container = %name, id = %created.id, "created container");
        Ok(RuntimeContainer { id: created.id, name: name.to_string(), ip_address, port: RIE_PORT })
    }

    async fn wait_ready(&self, container: &RuntimeContainer, timeout: Duration) -> Result<(), GatewayError> {
        let client = reqwest::Client::new();
        let deadline = tokio::time::Instant::now() + timeout;
        let url = format!(
            "http://{}:{}/2015-03-31/functions/function/invocations",
            container.ip_address, container.port
        );

        loop {
            if tokio::time::Instant::now() >= deadline {
                warn!(container = %container.name, "readiness timed out, removing container");
                let _ = self.stop(&container.id).await;
                return Err(GatewayError::RuntimeUnreachable(format!(
                    "{} did not become ready within {:?}",
                    container.name, timeout
                )));
            }

            if let Ok(resp) = client.post(&url).json(&serde_json::json!({ "ping": true })).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    async fn stop(&self, id: &str) -> Result<(), GatewayError> {
        let _ = self.docker.stop_container(id, Some(StopContainerOptions { t: 5 })).await;
        match self
            .docker
            .remove_container(id, Some(RemoveContainerOptions { force: true, ..Default::default() }))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(GatewayError::RuntimeUnreachable(e.to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<Worker>, GatewayError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![FUNCTION_LABEL.to_string()]);
        let containers: Vec<ContainerSummary> = self
            .docker
            .list_containers(Some(ListContainersOptions { all: true, filters, ..Default::default() }))
            .await
            .map_err(|e| GatewayError::RuntimeUnreachable(e.to_string()))?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c.names?.into_iter().next()?.trim_start_matches('/').to_string();
                Some(Worker::new(id, name, "127.0.0.1", RIE_PORT))
            })
            .collect())
    }
}

/// Docker already not having `id` is a successful stop, not a failure: a
/// second `stop`/`delete` on the same container must be a no-op.
fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(err, bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == 404)
}

fn function_label_value(container_name: &str) -> String {
    container_name.rsplit_once('-').map(|(function, _suffix)| function.to_string()).unwrap_or_else(|| container_name.to_string())
}

/// In-memory runtime for tests: containers are "created" instantly, are
/// always immediately ready, and identified by name rather than a real
/// Docker id.
#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<HashMap<String, RuntimeContainer>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ensure_running(
        &self,
        name: &str,
        _image: Option<&str>,
        _env: &HashMap<String, String>,
        _network: &str,
    ) -> Result<RuntimeContainer, GatewayError> {
        let mut containers = self.containers.lock().expect("fake runtime mutex poisoned");
        let container = containers.entry(name.to_string()).or_insert_with(|| RuntimeContainer {
            id: format!("fake-{name}"),
            name: name.to_string(),
            ip_address: "127.0.0.1".to_string(),
            port: RIE_PORT,
        });
        Ok(container.clone())
    }

    async fn wait_ready(&self, _container: &RuntimeContainer, _timeout: Duration) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<(), GatewayError> {
        let mut containers = self.containers.lock().expect("fake runtime mutex poisoned");
        containers.retain(|_, c| c.id != id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Worker>, GatewayError> {
        let containers = self.containers.lock().expect("fake runtime mutex poisoned");
        Ok(containers
            .values()
            .map(|c| Worker::new(c.id.clone(), c.name.clone(), c.ip_address.clone(), c.port))
            .collect())
    }
}
