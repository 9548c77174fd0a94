// # HTTP Transport Trait
//
// Defines the seam between the provider client and the HTTP stack.
//
// ## Implementations
//
// - reqwest: `geofuse-http` crate
// - Scripted doubles in the contract tests
//
// The transport executes exactly one request. Deadlines, status handling and
// metrics are owned by `ProviderClient`, so a transport must not retry, cache
// or apply its own timeout policy.

use async_trait::async_trait;

/// HTTP method and body of a provider request
#[derive(Debug, Clone, PartialEq)]
pub enum HttpMethod {
    Get,
    /// POST with a JSON body
    Post(serde_json::Value),
}

/// A fully built provider request
#[derive(Clone, PartialEq)]
pub struct ProviderRequest {
    /// Provider name (for logging and error attribution)
    pub provider: String,
    /// Final URL, credential included
    pub url: String,
    pub method: HttpMethod,
}

// The URL may carry a credential
impl std::fmt::Debug for ProviderRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let url = match self.url.split_once('?') {
            Some((base, _)) => format!("{}?<query>", base),
            None => self.url.clone(),
        };
        f.debug_struct("ProviderRequest")
            .field("provider", &self.provider)
            .field("url", &url)
            .field("method", &self.method)
            .finish()
    }
}

/// Raw answer from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for HTTP transport implementations
///
/// Implementations must be thread-safe; one transport is shared by every
/// concurrent provider call. Dropping the returned future must cancel the
/// in-flight request.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute a request
    ///
    /// # Returns
    ///
    /// - `Ok(TransportResponse)`: Any HTTP answer, including non-2xx
    /// - `Err(String)`: Transport failure (DNS, connect, TLS, reset)
    async fn execute(&self, request: &ProviderRequest) -> Result<TransportResponse, String>;
}
