//! The gateway's axum HTTP surface: admission, the direct Lambda invoke
//! path, and the catch-all API-Gateway-style proxy route.

use std::collections::HashMap;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use chrono::Utc;
use gateway_core::error::GatewayError;
use gateway_core::trace::{self, TRACE_HEADER};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{bearer_token, issue_token, verify_token};
use crate::event;
use crate::invoker::{InvocationType, LambdaInvoker};
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let invoker = std::sync::Arc::new(LambdaInvoker::new());

    let public = Router::new()
        .route("/auth", post(auth))
        .route("/health", get(health))
        .route("/metrics", get(metrics));

    let protected = Router::new()
        .route("/2015-03-31/functions/{name}/invocations", post(invoke_direct))
        .route("/{*path}", any(invoke_via_route))
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer_token))
        .with_state((state.clone(), invoker.clone()));

    public.with_state(state).merge(protected)
}

#[derive(Debug, Deserialize)]
struct AuthRequestBody {
    #[serde(rename = "AuthParameters")]
    auth_parameters: AuthParameters,
}

#[derive(Debug, Deserialize)]
struct AuthParameters {
    #[serde(rename = "USERNAME")]
    username: String,
    #[serde(rename = "PASSWORD")]
    password: String,
}

async fn auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AuthRequestBody>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let provided_key = headers.get("x-api-key").and_then(|v| v.to_str().ok()).unwrap_or_default();
    if state.settings.auth_api_key.is_empty() || provided_key != state.settings.auth_api_key {
        return Err(GatewayError::AuthFailed);
    }
    if body.auth_parameters.username != state.settings.auth_username
        || body.auth_parameters.password != state.settings.auth_password
    {
        return Err(GatewayError::AuthFailed);
    }

    let token = issue_token(&state.settings.jwt_secret, &body.auth_parameters.username, state.settings.jwt_ttl_secs)?;
    Ok(Json(json!({ "AuthenticationResult": { "IdToken": token } })))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "timestamp": Utc::now().to_rfc3339() }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

async fn require_bearer_token(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = request.headers().get("authorization").and_then(|v| v.to_str().ok());
    let token = auth_header.and_then(bearer_token);

    let subject = match token {
        Some(token) => match verify_token(&state.settings.jwt_secret, token) {
            Ok(subject) => subject,
            Err(err) => return err.into_response(),
        },
        None => return GatewayError::AuthFailed.into_response(),
    };

    request.extensions_mut().insert(AuthenticatedSubject(subject));
    next.run(request).await
}

#[derive(Clone)]
struct AuthenticatedSubject(String);

async fn invoke_direct(
    State((state, invoker)): State<(AppState, std::sync::Arc<LambdaInvoker>)>,
    Path(name): Path<String>,
    headers: HeaderMap,
    request: Request<Body>,
) -> Response {
    let trace_id = trace::root_id_or_generate(headers.get(TRACE_HEADER).and_then(|v| v.to_str().ok()));
    let invocation_type = InvocationType::parse(headers.get("x-amz-invocation-type").and_then(|v| v.to_str().ok()));

    let body = match to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes.to_vec(),
        Err(_) => return GatewayError::ConfigError("request body too large".to_string()).into_response(),
    };

    respond(
        invoker.invoke(&state, &name, body, invocation_type, Duration::from_secs(30), &trace_id).await,
        &trace_id,
    )
}

async fn invoke_via_route(
    State((state, invoker)): State<(AppState, std::sync::Arc<LambdaInvoker>)>,
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    request: Request<Body>,
) -> Response {
    let trace_id = trace::root_id_or_generate(headers.get(TRACE_HEADER).and_then(|v| v.to_str().ok()));
    let method = request.method().clone();
    let subject = request
        .extensions()
        .get::<AuthenticatedSubject>()
        .map(|s| s.0.clone())
        .unwrap_or_default();

    let full_path = format!("/{path}");
    let matched = match state.routes.match_route(method.as_str(), &full_path) {
        Some(m) => m,
        None => {
            return GatewayError::RouteNotFound { method: method.to_string(), path: full_path }.into_response();
        }
    };

    let header_map: HashMap<String, String> = headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();

    let body_bytes = match to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return GatewayError::ConfigError("request body too large".to_string()).into_response(),
    };
    let body_str = String::from_utf8_lossy(&body_bytes).to_string();

    let event = event::build(
        method.as_str(),
        &full_path,
        &matched.resource,
        matched.params,
        query,
        header_map,
        body_str,
        &subject,
        &trace_id,
    );
    let payload = match serde_json::to_vec(&event) {
        Ok(bytes) => bytes,
        Err(err) => return GatewayError::ConfigError(err.to_string()).into_response(),
    };

    respond_proxy(
        invoker
            .invoke(&state, &matched.function, payload, InvocationType::RequestResponse, Duration::from_secs(30), &trace_id)
            .await,
        &trace_id,
    )
}

/// Response for the direct `/2015-03-31/functions/{name}/invocations`
/// path: the RIE's response body is returned unchanged, per the real
/// Lambda Invoke API.
fn respond(result: Result<crate::invoker::RieResponse, GatewayError>, trace_id: &str) -> Response {
    match result {
        Ok(rie_response) => {
            let status = StatusCode::from_u16(rie_response.status).unwrap_or(StatusCode::OK);
            with_trace_header((status, rie_response.body).into_response(), trace_id)
        }
        Err(err) => with_trace_header(err.into_response(), trace_id),
    }
}

#[derive(Debug, Deserialize)]
struct ProxyResult {
    #[serde(rename = "statusCode")]
    status_code: u16,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: String,
}

/// Response for the catch-all proxy route: the function's returned
/// `{statusCode, headers, body}` envelope is unpacked into a real HTTP
/// response, the way an API Gateway Lambda proxy integration would.
/// A function that returns a non-conforming 200 body is treated as a
/// bug in the function and surfaced as a 502 rather than forwarded raw.
fn respond_proxy(result: Result<crate::invoker::RieResponse, GatewayError>, trace_id: &str) -> Response {
    match result {
        Ok(rie_response) => match serde_json::from_slice::<ProxyResult>(&rie_response.body) {
            Ok(proxy) => {
                let status = StatusCode::from_u16(proxy.status_code).unwrap_or(StatusCode::OK);
                let mut response = (status, proxy.body).into_response();
                for (name, value) in proxy.headers {
                    if let (Ok(header_name), Ok(header_value)) =
                        (name.parse::<axum::http::HeaderName>(), value.parse())
                    {
                        response.headers_mut().insert(header_name, header_value);
                    }
                }
                with_trace_header(response, trace_id)
            }
            Err(_) => with_trace_header(
                GatewayError::RieLogicalFailure("function response is not a valid proxy result".to_string())
                    .into_response(),
                trace_id,
            ),
        },
        Err(err) => with_trace_header(err.into_response(), trace_id),
    }
}

fn with_trace_header(mut response: Response, trace_id: &str) -> Response {
    if let Ok(header_value) = trace_id.parse() {
        response.headers_mut().insert(TRACE_HEADER, header_value);
    }
    response
}
