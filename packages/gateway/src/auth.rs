//! JWT issuance (`POST /auth`) and Bearer-token verification for every
//! other route, mirroring the teacher's `JwtConfig`/`decode::<JwtClaims>`
//! pattern but with HS256 fixed (the gateway issues its own tokens, so
//! there is no need to negotiate an algorithm).

use chrono::Utc;
use gateway_core::error::GatewayError;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    iat: i64,
}

/// Mint a signed JWT for `username`, valid for `ttl_secs` seconds.
pub fn issue_token(secret: &str, username: &str, ttl_secs: u64) -> Result<String, GatewayError> {
    let now = Utc::now().timestamp();
    let claims = Claims { sub: username.to_string(), exp: now + ttl_secs as i64, iat: now };
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| GatewayError::ConfigError(format!("failed to sign token: {e}")))
}

/// Verify a Bearer token and return its subject (the authenticated
/// username), surfaced downstream as `requestContext.authorizer`.
pub fn verify_token(secret: &str, token: &str) -> Result<String, GatewayError> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|_| GatewayError::AuthFailed)?;
    Ok(data.claims.sub)
}

/// Strip the `Bearer ` prefix from an `Authorization` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value.strip_prefix("Bearer ")
}
