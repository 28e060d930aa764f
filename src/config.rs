//! Dispatch engine configuration.
//!
//! An explicit configuration struct passed into the `Demuxer` and `Transport`
//! constructors. Defaults are an initialization convenience only; the struct
//! is never mutated after startup.

use std::time::Duration;

/// Default per-delivery transport timeout.
pub const DEFAULT_SIGNAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default lifetime of a signed entry token.
pub const DEFAULT_ENTRY_TOKEN_TTL: Duration = Duration::from_secs(60);

/// Configuration for the dispatch engine.
#[derive(Debug, Clone)]
pub struct DemuxConfig {
    /// Timeout applied uniformly to connect, write, and read phases of one
    /// outbound delivery.
    pub signal_timeout: Duration,
    /// User-Agent header sent with every delivery.
    pub user_agent: String,
    /// Allow plain-HTTP signal URLs (for development and testing).
    pub allow_http: bool,
    /// Lifetime of signed entry tokens appended to app entry URLs.
    pub entry_token_ttl: Duration,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            signal_timeout: DEFAULT_SIGNAL_TIMEOUT,
            user_agent: "demux/0.1".to_string(),
            allow_http: false,
            entry_token_ttl: DEFAULT_ENTRY_TOKEN_TTL,
        }
    }
}

impl DemuxConfig {
    /// Set the per-delivery transport timeout.
    #[must_use]
    pub fn with_signal_timeout(mut self, timeout: Duration) -> Self {
        self.signal_timeout = timeout;
        self
    }

    /// Set the outbound User-Agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Allow plain-HTTP signal URLs (for development and testing).
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Set the entry-token lifetime.
    #[must_use]
    pub fn with_entry_token_ttl(mut self, ttl: Duration) -> Self {
        self.entry_token_ttl = ttl;
        self
    }
}
