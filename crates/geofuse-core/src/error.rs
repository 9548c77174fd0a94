//! Error types for geofuse
//!
//! Per-provider failures (`Timeout`, `Network`, `HttpStatus`, `Parse`) are
//! recovered inside the engine: the provider abstains and resolution moves
//! on. Only `AllProvidersFailed` ends a resolution.

use thiserror::Error;

/// Result type alias for geofuse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for geofuse
#[derive(Error, Debug)]
pub enum Error {
    /// Provider did not answer within its deadline
    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    Timeout {
        /// Provider name
        provider: String,
        /// Deadline that expired
        timeout_ms: u64,
    },

    /// Transport-level failure (DNS, connect, TLS, reset)
    #[error("Network error ({provider}): {message}")]
    Network {
        /// Provider name
        provider: String,
        /// Transport error text
        message: String,
    },

    /// Provider answered with a non-2xx status
    #[error("HTTP {status} from {provider}")]
    HttpStatus {
        /// Provider name
        provider: String,
        /// Status code
        status: u16,
    },

    /// Provider response was malformed or reported an error payload
    #[error("Failed to parse {provider} response: {message}")]
    Parse {
        /// Provider name
        provider: String,
        /// What was wrong with the payload
        message: String,
    },

    /// No provider produced an acceptable record
    #[error("All location providers failed ({attempted} attempted)")]
    AllProvidersFailed {
        /// Number of providers tried
        attempted: usize,
        /// Failure text of each provider, in provider order
        failures: Vec<String>,
    },

    /// Malformed request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cache store errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a timeout error
    pub fn timeout(provider: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            provider: provider.into(),
            timeout_ms,
        }
    }

    /// Create a network error
    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(provider: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            provider: provider.into(),
            status,
        }
    }

    /// Create a parse error
    pub fn parse(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a cache error
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Whether this error means a single provider abstained
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Network { .. } | Self::HttpStatus { .. } | Self::Parse { .. }
        )
    }

    /// Provider name for per-provider failures
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Timeout { provider, .. }
            | Self::Network { provider, .. }
            | Self::HttpStatus { provider, .. }
            | Self::Parse { provider, .. } => Some(provider),
            _ => None,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Derive a human-readable hint from a failure
///
/// The hint is keyed on the failure text, including the individual provider
/// failures folded into `AllProvidersFailed`.
pub fn suggestion_for(error: &Error) -> &'static str {
    let mut text = error.to_string();
    if let Error::AllProvidersFailed { failures, .. } = error {
        for failure in failures {
            text.push(' ');
            text.push_str(failure);
        }
    }
    let text = text.to_lowercase();

    if text.contains("timed out") || text.contains("timeout") {
        return "Request timed out. Try: 1) increase API_TIMEOUT 2) check network connectivity 3) use other providers";
    }

    if text.contains("network") || text.contains("unreachable") {
        return "Network problem. Try: 1) check network connectivity 2) check firewall settings 3) retry later";
    }

    if text.contains("api key")
        || text.contains("unauthorized")
        || text.contains("http 401")
        || text.contains("http 403")
    {
        return "Credential problem. Try: 1) check the configured API keys 2) confirm the keys are valid 3) use other providers";
    }

    if text.contains("all location providers failed") || text.contains("no location data") {
        return "Every location provider failed. Try: 1) check network connectivity 2) check provider configuration 3) retry later";
    }

    "Location service is temporarily unavailable. Retry later."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_failure_classification() {
        assert!(Error::timeout("ipapi_co", 100).is_provider_failure());
        assert!(Error::network("ipapi_co", "reset").is_provider_failure());
        assert!(Error::http_status("ipapi_co", 429).is_provider_failure());
        assert!(Error::parse("ipapi_co", "bad").is_provider_failure());
        assert!(!Error::config("bad").is_provider_failure());
        assert!(
            !Error::AllProvidersFailed {
                attempted: 1,
                failures: vec![]
            }
            .is_provider_failure()
        );

        assert_eq!(Error::http_status("ipwho_is", 500).provider(), Some("ipwho_is"));
        assert_eq!(Error::invalid_input("x").provider(), None);
    }

    #[test]
    fn test_suggestion_uses_inner_failures() {
        let err = Error::AllProvidersFailed {
            attempted: 2,
            failures: vec![
                Error::timeout("ipapi_co", 15000).to_string(),
                Error::timeout("ipwho_is", 15000).to_string(),
            ],
        };
        assert!(suggestion_for(&err).contains("API_TIMEOUT"));

        let err = Error::AllProvidersFailed {
            attempted: 1,
            failures: vec![Error::http_status("amap_ip", 403).to_string()],
        };
        assert!(suggestion_for(&err).contains("API keys"));

        let err = Error::AllProvidersFailed {
            attempted: 1,
            failures: vec![Error::parse("ipapi_co", "missing field").to_string()],
        };
        assert!(suggestion_for(&err).starts_with("Every location provider failed"));

        assert!(suggestion_for(&Error::Other("boom".into())).starts_with("Location service"));
    }
}
