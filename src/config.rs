//! Client configuration.

use std::time::Duration;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "API_KEY";

/// Environment variable that turns off certificate verification when set to `1`, `true` or
/// `yes`.
pub const ACCEPT_INVALID_CERTS_ENV: &str = "INSISTENT_ACCEPT_INVALID_CERTS";

/// Header the API key is sent in unless configured otherwise.
pub const DEFAULT_API_KEY_HEADER: &str = "X-DreamFactory-Api-Key";

/// Settings read once when a [`Client`](crate::Client) is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Sent in `api_key_header` on every request when present.
    pub api_key: Option<String>,
    /// Name of the API key header.
    pub api_key_header: String,
    /// Connection timeout enforced by the transport.
    pub connect_timeout: Duration,
    /// User agent string.
    pub user_agent: String,
    /// Skip certificate validation on TLS connections (self-signed local servers).
    pub accept_invalid_certs: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("insistent/{}", env!("CARGO_PKG_VERSION")),
            accept_invalid_certs: false,
        }
    }
}

impl ClientConfig {
    /// Defaults plus the API key from [`API_KEY_ENV`] and the TLS opt-out from
    /// [`ACCEPT_INVALID_CERTS_ENV`]. An empty API key counts as absent.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`] with variables resolved by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let accept_invalid_certs = lookup(ACCEPT_INVALID_CERTS_ENV)
            .map(|value| is_truthy(&value))
            .unwrap_or(false);
        Self { accept_invalid_certs, ..Self::default() }.with_api_key(lookup(API_KEY_ENV))
    }

    /// Replace the API key; empty strings are dropped.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.is_empty());
        self
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
