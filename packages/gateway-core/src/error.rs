//! Error taxonomy for the control plane, with an HTTP-status mapping
//! so the gateway can convert any of these directly into a client response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("authentication failed")]
    AuthFailed,

    #[error("function not found: {0}")]
    FunctionNotFound(String),

    #[error("no route matches {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("timed out waiting for a free worker")]
    AcquireTimeout,

    #[error("orchestrator unreachable: {0}")]
    OrchestratorUnreachable(String),

    #[error("orchestrator request timed out")]
    OrchestratorTimeout,

    #[error("orchestrator returned {status}: {body}")]
    OrchestratorError { status: u16, body: String },

    #[error("could not connect to runtime interface emulator: {0}")]
    RieConnectionError(String),

    #[error("runtime interface emulator timed out")]
    RieTimeout,

    #[error("function reported a logical failure: {0}")]
    RieLogicalFailure(String),

    #[error("circuit breaker open")]
    CircuitOpen,

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("container runtime unreachable: {0}")]
    RuntimeUnreachable(String),
}

impl GatewayError {
    /// Stable machine-readable kind, used in logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthFailed => "AuthFailed",
            Self::FunctionNotFound(_) => "FunctionNotFound",
            Self::RouteNotFound { .. } => "RouteNotFound",
            Self::AcquireTimeout => "AcquireTimeout",
            Self::OrchestratorUnreachable(_) => "OrchestratorUnreachable",
            Self::OrchestratorTimeout => "OrchestratorTimeout",
            Self::OrchestratorError { .. } => "OrchestratorError",
            Self::RieConnectionError(_) => "RIEConnectionError",
            Self::RieTimeout => "RIETimeout",
            Self::RieLogicalFailure(_) => "RIELogicalFailure",
            Self::CircuitOpen => "CircuitOpen",
            Self::ConfigError(_) => "ConfigError",
            Self::RuntimeUnreachable(_) => "RuntimeUnreachable",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthFailed => StatusCode::UNAUTHORIZED,
            Self::FunctionNotFound(_) | Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::AcquireTimeout | Self::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            Self::OrchestratorUnreachable(_) | Self::RuntimeUnreachable(_) | Self::RieConnectionError(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::OrchestratorTimeout | Self::RieTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::RieLogicalFailure(_) | Self::OrchestratorError { .. } => StatusCode::BAD_GATEWAY,
            Self::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Never carries raw container-runtime detail.
    fn public_message(&self) -> String {
        match self {
            Self::CircuitOpen => "Circuit Breaker Open".to_string(),
            Self::AuthFailed => "Unauthorized".to_string(),
            Self::FunctionNotFound(f) => format!("function not found: {f}"),
            Self::RouteNotFound { .. } => "not found".to_string(),
            Self::AcquireTimeout => "no capacity available, try again".to_string(),
            Self::OrchestratorUnreachable(_) | Self::RuntimeUnreachable(_) => {
                "upstream orchestrator unavailable".to_string()
            }
            Self::OrchestratorTimeout | Self::RieTimeout => "upstream timed out".to_string(),
            Self::OrchestratorError { .. } | Self::RieConnectionError(_) | Self::RieLogicalFailure(_) => {
                "upstream error".to_string()
            }
            Self::ConfigError(_) => "internal configuration error".to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({ "message": self.public_message() });
        (status, axum::Json(body)).into_response()
    }
}
