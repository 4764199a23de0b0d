//! Authenticated request → acquire worker → POST to RIE → classify →
//! release-or-evict. The one place where pool, cache, breaker and
//! orchestrator client all meet.

use std::time::{Duration, Instant};

use gateway_core::error::GatewayError;
use reqwest::Client;
use reqwest::header::HeaderMap;
use tracing::{info, warn};

use crate::state::AppState;

const MAX_LOGICAL_FAILURE_PROBE_BYTES: usize = 10 * 1024;
const FUNCTION_ERROR_HEADER: &str = "x-amz-function-error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationType {
    RequestResponse,
    Event,
}

impl InvocationType {
    pub fn parse(header_value: Option<&str>) -> Self {
        match header_value {
            Some("Event") => Self::Event,
            _ => Self::RequestResponse,
        }
    }
}

pub struct RieResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

pub struct LambdaInvoker {
    http: Client,
}

impl Default for LambdaInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl LambdaInvoker {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }

    /// Drives one invocation to completion, returning the RIE's response
    /// unchanged on success. The caller maps `Err` to an HTTP status per
    /// the error-kind table.
    pub async fn invoke(
        &self,
        state: &AppState,
        function: &str,
        payload: Vec<u8>,
        invocation_type: InvocationType,
        request_timeout: Duration,
        trace_id: &str,
    ) -> Result<RieResponse, GatewayError> {
        let config = state
            .functions
            .get(function)
            .ok_or_else(|| GatewayError::FunctionNotFound(function.to_string()))?;

        let mut env = config.environment.clone();
        env.insert("GATEWAY_TRACE_ID".to_string(), trace_id.to_string());
        let image = config.image.clone();

        let orchestrator = state.orchestrator.clone();
        let trace_owned = trace_id.to_string();
        let cache = state.cache.clone();
        let metrics = state.metrics.clone();

        let lease = state
            .pools
            .acquire(function, move |function| async move {
                if let Some(worker) = cache.get(&function) {
                    metrics.record_cache_hit(&function);
                    return Ok(vec![worker]);
                }
                metrics.record_cache_miss(&function);
                orchestrator.provision(&function, 1, image.as_deref(), env, &trace_owned).await
            })
            .await?;

        state.cache.set(function, lease.worker().clone());

        let breaker = state.breaker_for(function);
        let started = Instant::now();
        let endpoint = lease.worker().endpoint();

        // Logical failures (RIE status >= 500, or a 200 carrying an
        // errorType/errorMessage body) are raised here, inside the breaker's
        // operation, so the breaker's failure counter sees them exactly like
        // a transport-level error. Classifying them outside `call` would let
        // a function that deterministically 500s sail through the breaker
        // forever.
        let outcome = breaker
            .call(|| async {
                let response = self.post_to_rie(&endpoint, payload, invocation_type, request_timeout).await?;
                if is_logical_failure(&response) {
                    Err(GatewayError::RieLogicalFailure(format!("status {}", response.status)))
                } else {
                    Ok(response)
                }
            })
            .await;

        let elapsed = started.elapsed();

        match outcome {
            Ok(response) => {
                info!(function, trace_id, elapsed_ms = elapsed.as_millis(), "invocation succeeded");
                state.metrics.record_invocation(function, "success", elapsed.as_secs_f64());
                state.pools.release(function, lease);
                Ok(response)
            }
            Err(gateway_core::breaker::CircuitBreakerError::Open) => {
                state.metrics.record_invocation(function, "circuit_open", elapsed.as_secs_f64());
                state.pools.release(function, lease);
                Err(GatewayError::CircuitOpen)
            }
            Err(gateway_core::breaker::CircuitBreakerError::Inner(GatewayError::RieLogicalFailure(detail))) => {
                warn!(function, trace_id, "function reported a logical failure, evicting worker");
                state.metrics.record_invocation(function, "logical_failure", elapsed.as_secs_f64());
                state.cache.invalidate(function);
                state.pools.evict(function, lease);
                Err(GatewayError::RieLogicalFailure(detail))
            }
            Err(gateway_core::breaker::CircuitBreakerError::Inner(err)) => {
                state.metrics.record_invocation(function, "error", elapsed.as_secs_f64());
                let evict_and_invalidate =
                    matches!(err, GatewayError::RieConnectionError(_) | GatewayError::RieTimeout);
                if evict_and_invalidate {
                    state.cache.invalidate(function);
                }
                state.pools.evict(function, lease);
                Err(err)
            }
        }
    }

    async fn post_to_rie(
        &self,
        endpoint: &str,
        payload: Vec<u8>,
        invocation_type: InvocationType,
        request_timeout: Duration,
    ) -> Result<RieResponse, GatewayError> {
        let url = format!("http://{endpoint}/2015-03-31/functions/function/invocations");

        if invocation_type == InvocationType::Event {
            let http = self.http.clone();
            tokio::spawn(async move {
                let _ = http.post(&url).body(payload).timeout(request_timeout).send().await;
            });
            return Ok(RieResponse { status: 202, headers: HeaderMap::new(), body: b"{}".to_vec() });
        }

        let response = self
            .http
            .post(&url)
            .body(payload)
            .timeout(request_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::RieTimeout
                } else {
                    GatewayError::RieConnectionError(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        Ok(RieResponse { status, headers, body })
    }
}

/// A logical failure is a status >= 500, a response carrying the RIE's
/// function-error header, or a 200 whose body parses as
/// `{"errorType"|"errorMessage": ...}`, bounded to a small body size so a
/// huge successful payload never pays the parse cost.
fn is_logical_failure(response: &RieResponse) -> bool {
    if response.status >= 500 {
        return true;
    }
    if response.headers.contains_key(FUNCTION_ERROR_HEADER) {
        return true;
    }
    if response.status == 200 && response.body.len() <= MAX_LOGICAL_FAILURE_PROBE_BYTES {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&response.body) {
            if let Some(obj) = value.as_object() {
                return obj.contains_key("errorType") || obj.contains_key("errorMessage");
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_500_is_a_logical_failure() {
        assert!(is_logical_failure(&RieResponse { status: 500, headers: HeaderMap::new(), body: Vec::new() }));
    }

    #[test]
    fn status_200_with_error_type_body_is_a_logical_failure() {
        let body = br#"{"errorType":"ValueError","errorMessage":"bad input"}"#.to_vec();
        assert!(is_logical_failure(&RieResponse { status: 200, headers: HeaderMap::new(), body }));
    }

    #[test]
    fn status_200_with_function_error_header_is_a_logical_failure() {
        let mut headers = HeaderMap::new();
        headers.insert(FUNCTION_ERROR_HEADER, "Unhandled".parse().unwrap());
        let body = vec![b'a'; MAX_LOGICAL_FAILURE_PROBE_BYTES + 1];
        assert!(is_logical_failure(&RieResponse { status: 200, headers, body }));
    }

    #[test]
    fn status_200_with_plain_body_is_success() {
        let body = br#"{"ok":true}"#.to_vec();
        assert!(!is_logical_failure(&RieResponse { status: 200, headers: HeaderMap::new(), body }));
    }

    #[test]
    fn oversized_200_body_is_never_parsed_for_logical_failure() {
        let body = vec![b'a'; MAX_LOGICAL_FAILURE_PROBE_BYTES + 1];
        assert!(!is_logical_failure(&RieResponse { status: 200, headers: HeaderMap::new(), body }));
    }

    #[test]
    fn invocation_type_defaults_to_request_response() {
        assert_eq!(InvocationType::parse(None), InvocationType::RequestResponse);
        assert_eq!(InvocationType::parse(Some("Event")), InvocationType::Event);
        assert_eq!(InvocationType::parse(Some("RequestResponse")), InvocationType::RequestResponse);
    }
}
