//! HTTP client to the Orchestrator service: provision, delete, list and
//! heartbeat, with trace-id propagation and an outcome metric per call.

use std::sync::Arc;
use std::time::Duration;

use gateway_core::error::GatewayError;
use gateway_core::metrics::Metrics;
use gateway_core::trace::TRACE_HEADER;
use gateway_core::worker::Worker;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Serialize)]
struct ProvisionRequest<'a> {
    function_name: &'a str,
    count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    #[serde(default)]
    env: std::collections::HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProvisionResponse {
    workers: Vec<Worker>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    containers: Vec<Worker>,
}

#[derive(Debug, Serialize)]
struct HeartbeatRequest<'a> {
    function_name: &'a str,
    container_names: &'a [String],
}

/// Client to the Orchestrator's HTTP control-plane API.
pub struct OrchestratorClient {
    base_url: String,
    http: Client,
    metrics: Option<Arc<Metrics>>,
}

impl OrchestratorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record(&self, op: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_orchestrator_request(op, outcome);
        }
    }

    fn trace_header(trace_id: &str) -> (&'static str, String) {
        (TRACE_HEADER, trace_id.to_string())
    }

    /// POST `/containers/provision`. `provision` MUST return at least one
    /// worker per the pool's `acquire` contract; an empty-but-200 response
    /// is surfaced to the caller unchanged, which turns into the pool's own
    /// "provision returned no workers" error.
    pub async fn provision(
        &self,
        function: &str,
        count: u32,
        image: Option<&str>,
        env: std::collections::HashMap<String, String>,
        trace_id: &str,
    ) -> Result<Vec<Worker>, GatewayError> {
        let body = ProvisionRequest {
            function_name: function,
            count,
            image,
            env,
            request_id: Some(trace_id.to_string()),
        };

        let (header_name, header_value) = Self::trace_header(trace_id);
        let response = self
            .http
            .post(format!("{}/containers/provision", self.base_url))
            .header(header_name, header_value)
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => {
                self.record("provision", "not_found");
                Err(GatewayError::FunctionNotFound(function.to_string()))
            }
            Ok(resp) if resp.status().is_success() => {
                let parsed: ProvisionResponse = resp
                    .json()
                    .await
                    .map_err(|e| GatewayError::OrchestratorError { status: 200, body: e.to_string() })?;
                self.record("provision", "success");
                Ok(parsed.workers)
            }
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                self.record("provision", "error");
                Err(GatewayError::OrchestratorError { status, body })
            }
            Err(err) => {
                self.record("provision", classify_transport_error(&err));
                Err(transport_error(err))
            }
        }
    }

    /// DELETE `/containers/{id}`. Idempotent: a 404 is treated as success.
    pub async fn delete(&self, worker_id: &str, trace_id: &str) -> Result<(), GatewayError> {
        let (header_name, header_value) = Self::trace_header(trace_id);
        let response = self
            .http
            .delete(format!("{}/containers/{worker_id}", self.base_url))
            .header(header_name, header_value)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() || resp.status() == reqwest::StatusCode::NOT_FOUND => {
                self.record("delete", "success");
                Ok(())
            }
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                self.record("delete", "error");
                Err(GatewayError::OrchestratorError { status, body })
            }
            Err(err) => {
                self.record("delete", classify_transport_error(&err));
                Err(transport_error(err))
            }
        }
    }

    /// GET `/containers/sync`.
    pub async fn list(&self, trace_id: &str) -> Result<Vec<Worker>, GatewayError> {
        let (header_name, header_value) = Self::trace_header(trace_id);
        let response = self
            .http
            .get(format!("{}/containers/sync", self.base_url))
            .header(header_name, header_value)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let parsed: ListResponse = resp
                    .json()
                    .await
                    .map_err(|e| GatewayError::OrchestratorError { status: 200, body: e.to_string() })?;
                self.record("list", "success");
                Ok(parsed.containers)
            }
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                self.record("list", "error");
                Err(GatewayError::OrchestratorError { status, body })
            }
            Err(err) => {
                self.record("list", classify_transport_error(&err));
                Err(transport_error(err))
            }
        }
    }

    /// POST `/heartbeat`. Non-critical: failures are logged and swallowed
    /// so a flaky orchestrator never blocks the janitor's tick.
    pub async fn heartbeat(&self, function: &str, names: &[String], trace_id: &str) {
        let (header_name, header_value) = Self::trace_header(trace_id);
        let body = HeartbeatRequest { function_name: function, container_names: names };

        let response = self
            .http
            .post(format!("{}/heartbeat", self.base_url))
            .header(header_name, header_value)
            .json(&body)
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => self.record("heartbeat", "success"),
            Ok(resp) => {
                warn!(function, status = %resp.status(), "heartbeat rejected by orchestrator");
                self.record("heartbeat", "error");
            }
            Err(err) => {
                warn!(function, error = %err, "heartbeat request failed");
                self.record("heartbeat", classify_transport_error(&err));
            }
        }
    }
}

fn classify_transport_error(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "timeout"
    } else {
        "unreachable"
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::OrchestratorTimeout
    } else {
        GatewayError::OrchestratorUnreachable(err.to_string())
    }
}
