//! Test doubles and common utilities for the resolution contract tests
//!
//! Providers in these tests all speak the ipwho.is response shape and live at
//! `https://<name>.test/json`.

#![allow(dead_code)]

use async_trait::async_trait;
use geofuse_core::config::{EngineSettings, ResolutionMode};
use geofuse_core::normalize::IpwhoIsNormalizer;
use geofuse_core::registry::{ProviderKind, ProviderRegistry, ProviderSpec};
use geofuse_core::traits::{CacheStore, HttpTransport, ProviderRequest, TransportResponse};
use geofuse_core::{FusionEngine, MetricsCollector, ProviderClient};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Per-provider call deadline used by the helpers
pub const CALL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
enum Reply {
    Status(u16, String),
    Fail(String),
}

#[derive(Clone)]
struct Script {
    delay: Duration,
    reply: Reply,
}

/// Transport answering from a per-URL script and counting calls
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` immediately
    pub fn respond(self, url: &str, status: u16, body: impl Into<String>) -> Self {
        self.respond_after(url, Duration::ZERO, status, body)
    }

    /// Answer `url` after `delay`
    pub fn respond_after(
        self,
        url: &str,
        delay: Duration,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        self.script(
            url,
            Script {
                delay,
                reply: Reply::Status(status, body.into()),
            },
        )
    }

    /// Fail `url` at the transport level
    pub fn fail(self, url: &str, message: &str) -> Self {
        self.script(
            url,
            Script {
                delay: Duration::ZERO,
                reply: Reply::Fail(message.to_string()),
            },
        )
    }

    fn script(self, url: &str, script: Script) -> Self {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
        self
    }

    /// Number of requests sent to `url`
    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    /// Number of requests sent anywhere
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: &ProviderRequest) -> Result<TransportResponse, String> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(request.url.clone())
            .or_default() += 1;

        let script = self.scripts.lock().unwrap().get(&request.url).cloned();
        let Some(script) = script else {
            return Err(format!("no route to {}", request.url));
        };

        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }

        match script.reply {
            Reply::Status(status, body) => Ok(TransportResponse {
                status,
                body: body.into_bytes(),
            }),
            Reply::Fail(message) => Err(message),
        }
    }
}

/// URL of a test provider
pub fn url(name: &str) -> String {
    format!("https://{}.test/json", name)
}

/// Registry of IP providers, registered in the given order
pub fn registry(providers: &[(&str, u32)]) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for (name, priority) in providers {
        registry
            .register(
                ProviderSpec::new(*name, ProviderKind::Ip, *priority, url(name), CALL_TIMEOUT),
                Arc::new(IpwhoIsNormalizer),
            )
            .unwrap();
    }
    registry
}

/// Complete ipwho.is body, normalized confidence 1.0
pub fn located(lat: f64, lon: f64, city: &str) -> String {
    serde_json::json!({
        "success": true,
        "ip": "203.0.113.10",
        "country": "Testland",
        "country_code": "TL",
        "region": "Test Region",
        "city": city,
        "latitude": lat,
        "longitude": lon,
    })
    .to_string()
}

/// Coordinates only, normalized confidence 0.7
pub fn bare_location(lat: f64, lon: f64) -> String {
    serde_json::json!({
        "success": true,
        "latitude": lat,
        "longitude": lon,
    })
    .to_string()
}

pub fn settings(mode: ResolutionMode) -> EngineSettings {
    EngineSettings {
        mode,
        max_api_calls: 3,
        min_confidence_threshold: 0.6,
        resolution_timeout: Duration::from_secs(5),
        cache_key: "location_optimal".to_string(),
    }
}

/// Engine wired to a scripted transport and a fresh metrics collector
pub fn engine(
    registry: ProviderRegistry,
    transport: Arc<ScriptedTransport>,
    cache: Option<Arc<dyn CacheStore>>,
    settings: EngineSettings,
) -> FusionEngine {
    let client = ProviderClient::new(transport, Arc::new(MetricsCollector::new()));
    FusionEngine::new(Arc::new(registry), client, cache, settings)
}
