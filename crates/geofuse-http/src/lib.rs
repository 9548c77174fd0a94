// # HTTP Transport
//
// This crate provides the reqwest-based `HttpTransport` used by the geofuse
// binary.
//
// ## Scope
//
// The transport executes exactly one request and hands back status and body.
// Deadlines, status interpretation and metrics belong to
// `geofuse_core::ProviderClient`; the client built here therefore carries no
// request timeout of its own. Dropping the future returned by `execute`
// cancels the request.

use async_trait::async_trait;
use geofuse_core::traits::{HttpMethod, HttpTransport, ProviderRequest, TransportResponse};
use geofuse_core::{Error, Result};

/// User-Agent sent with every provider request
pub const USER_AGENT: &str = concat!("geofuse/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with the default client
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Other(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Use a preconfigured client (proxies, custom TLS)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        request: &ProviderRequest,
    ) -> std::result::Result<TransportResponse, String> {
        let builder = match &request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post(body) => self.client.post(&request.url).json(body),
        };

        // reqwest errors can echo the URL, which may carry a credential
        let response = builder
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| describe(&e.without_url()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| format!("Failed to read response body: {}", describe(&e.without_url())))?;

        tracing::trace!(
            "{} answered {} with {} bytes",
            request.provider,
            status,
            body.len()
        );

        Ok(TransportResponse {
            status,
            body: body.to_vec(),
        })
    }
}

fn describe(error: &reqwest::Error) -> String {
    if error.is_connect() {
        format!("connection failed: {}", error)
    } else if error.is_timeout() {
        format!("transport timeout: {}", error)
    } else {
        format!("request failed: {}", error)
    }
}
