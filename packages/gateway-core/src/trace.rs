//! X-Ray style trace id handling: `Root=1-<8-hex-epoch>-<24-hex-random>;Sampled=1`.

use crate::worker::now_epoch_secs;

pub const TRACE_HEADER: &str = "x-amzn-trace-id";

/// Generate a fresh trace id in the same shape API Gateway would hand us.
pub fn generate() -> String {
    let epoch = now_epoch_secs();
    let random: u128 = (u128::from(fastrand::u64(..)) << 32) | u128::from(fastrand::u32(..));
    format!("Root=1-{epoch:08x}-{random:024x};Sampled=1")
}

/// Extract the root trace id from a full trace header value, falling back to
/// generating a new one if the header is absent or malformed.
pub fn root_id_or_generate(header_value: Option<&str>) -> String {
    match header_value {
        Some(v) if !v.trim().is_empty() => v.to_string(),
        _ => generate(),
    }
}
