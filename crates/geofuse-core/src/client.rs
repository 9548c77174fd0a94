//! Provider client
//!
//! Performs one bounded request against one provider and reports it to the
//! metrics collector.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::metrics::MetricsCollector;
use crate::registry::ProviderSpec;
use crate::traits::{HttpTransport, TransportResponse};

/// Raw answer of a successful provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub provider: String,
    pub status: u16,
    pub body: Vec<u8>,
}

/// Calls providers through a shared transport
#[derive(Clone)]
pub struct ProviderClient {
    transport: Arc<dyn HttpTransport>,
    metrics: Arc<MetricsCollector>,
}

impl ProviderClient {
    pub fn new(transport: Arc<dyn HttpTransport>, metrics: Arc<MetricsCollector>) -> Self {
        Self { transport, metrics }
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Call one provider
    ///
    /// The provider timeout is a hard deadline: on expiry the in-flight
    /// request is dropped and `Error::Timeout` returned. Every call is
    /// recorded exactly once, whatever its outcome.
    ///
    /// # Errors
    ///
    /// - `Error::Timeout`: deadline expired
    /// - `Error::Network`: transport failure
    /// - `Error::HttpStatus`: non-2xx answer
    /// - `Error::Config`: the request could not be built
    pub async fn call(&self, spec: &ProviderSpec) -> Result<RawResponse> {
        self.call_within(spec, spec.timeout).await
    }

    /// Call one provider, giving up after `budget` if that comes first
    pub async fn call_within(&self, spec: &ProviderSpec, budget: Duration) -> Result<RawResponse> {
        let request = spec.build_request()?;
        tracing::debug!("Calling provider {} ({:?})", spec.name, request);

        let limit = spec.timeout.min(budget);
        let started = Instant::now();
        let outcome = tokio::time::timeout(limit, self.transport.execute(&request)).await;
        let elapsed_ms = elapsed_millis(started);

        let result = match outcome {
            Err(_) => Err(Error::timeout(&spec.name, duration_millis(limit))),
            Ok(Err(message)) => Err(Error::network(&spec.name, message)),
            Ok(Ok(response)) => into_raw(&spec.name, response),
        };

        self.metrics.record(&spec.name, elapsed_ms, result.is_ok());
        match &result {
            Ok(raw) => tracing::debug!(
                "Provider {} answered {} in {}ms ({} bytes)",
                spec.name,
                raw.status,
                elapsed_ms,
                raw.body.len()
            ),
            Err(e) => tracing::debug!("Provider {} failed after {}ms: {}", spec.name, elapsed_ms, e),
        }
        result
    }
}

fn into_raw(provider: &str, response: TransportResponse) -> Result<RawResponse> {
    if !response.is_success() {
        return Err(Error::http_status(provider, response.status));
    }
    Ok(RawResponse {
        provider: provider.to_string(),
        status: response.status,
        body: response.body,
    })
}

pub(crate) fn elapsed_millis(started: Instant) -> u64 {
    duration_millis(started.elapsed())
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
