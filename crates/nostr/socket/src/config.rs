//! Socket client configuration

use std::time::Duration;

/// Socket client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConfig {
    /// Ask the relay for zlib-compressed binary frames right after connecting
    pub compression: bool,
    /// Grace period before an EOSE is published to subscribers
    pub eose_delay: Duration,
    /// Max characters per log line when logging frame text
    pub log_chunk_size: usize,
    /// How long `publish`, `query` and `count` wait for the relay's reply
    pub request_timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        let compression = std::env::var("NOSTR_SOCKET_COMPRESSION")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let eose_delay = std::env::var("NOSTR_SOCKET_EOSE_DELAY_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(50));

        Self {
            compression,
            eose_delay,
            log_chunk_size: 4000,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl SocketConfig {
    /// Request zlib binary frames after connecting.
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Set the grace period applied to EOSE before publishing.
    pub fn with_eose_delay(mut self, delay: Duration) -> Self {
        self.eose_delay = delay;
        self
    }

    /// Set the log segment size in characters (0 disables chunking).
    pub fn with_log_chunk_size(mut self, chars: usize) -> Self {
        self.log_chunk_size = chars;
        self
    }

    /// Set how long helpers wait for the relay's reply.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
