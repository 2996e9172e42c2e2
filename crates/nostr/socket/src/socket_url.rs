//! Relay URL normalization.

use crate::error::{Result, SocketError};
use url::Url;

/// Normalize a relay address into a WebSocket URL.
///
/// `http`/`https` are rewritten to `ws`/`wss`, surrounding whitespace and
/// trailing slashes are removed. Any other scheme is rejected.
pub fn normalize_socket_url(input: &str) -> Result<String> {
    let trimmed = input.trim();
    let (scheme, rest) = trimmed
        .split_once("://")
        .ok_or_else(|| SocketError::InvalidUrl(format!("missing scheme: {}", trimmed)))?;

    let scheme = match scheme.to_ascii_lowercase().as_str() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(SocketError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                other
            )));
        }
    };

    let normalized = format!("{}://{}", scheme, rest.trim_end_matches('/'));
    let parsed = Url::parse(&normalized)?;
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(SocketError::InvalidUrl(format!("missing host: {}", trimmed)));
    }

    Ok(normalized)
}
