//! Configuration types for geofuse
//!
//! Every field is a pure input to registry, engine and cache construction;
//! nothing is re-read during a resolution.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Main locator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// Endpoint of the primary IP provider (`ipapi_co`)
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,

    /// Per-provider request deadline (in milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Deadline for a whole resolution (in milliseconds)
    #[serde(default = "default_resolution_timeout_ms")]
    pub resolution_timeout_ms: u64,

    /// Query several providers concurrently and fuse their answers
    #[serde(default)]
    pub multi_source: bool,

    /// Minimum adjusted confidence for a record to take part in fusion
    #[serde(default = "default_min_confidence_threshold")]
    pub min_confidence_threshold: f64,

    /// Number of providers queried in multi-source mode
    #[serde(default = "default_max_api_calls")]
    pub max_api_calls: usize,

    /// Result cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Provider credentials
    #[serde(default)]
    pub credentials: Credentials,

    /// Attach the metrics snapshot to successful responses
    #[serde(default = "default_enabled")]
    pub performance_monitoring: bool,
}

impl LocatorConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            api_endpoint: default_api_endpoint(),
            request_timeout_ms: default_request_timeout_ms(),
            resolution_timeout_ms: default_resolution_timeout_ms(),
            multi_source: false,
            min_confidence_threshold: default_min_confidence_threshold(),
            max_api_calls: default_max_api_calls(),
            cache: CacheConfig::default(),
            credentials: Credentials::default(),
            performance_monitoring: true,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if !self.api_endpoint.starts_with("https://") && !self.api_endpoint.starts_with("http://") {
            return Err(crate::Error::config(format!(
                "API endpoint must use HTTP or HTTPS scheme. Got: {}",
                self.api_endpoint
            )));
        }

        if self.request_timeout_ms == 0 {
            return Err(crate::Error::config("Request timeout must be > 0"));
        }

        if self.resolution_timeout_ms == 0 {
            return Err(crate::Error::config("Resolution timeout must be > 0"));
        }

        if !(0.0..=1.0).contains(&self.min_confidence_threshold) {
            return Err(crate::Error::config(format!(
                "Confidence threshold must be between 0 and 1. Got: {}",
                self.min_confidence_threshold
            )));
        }

        if self.max_api_calls == 0 {
            return Err(crate::Error::config("Max API calls must be >= 1"));
        }

        self.cache.validate()?;

        Ok(())
    }

    /// Resolution mode selected by `multi_source`
    pub fn mode(&self) -> ResolutionMode {
        if self.multi_source {
            ResolutionMode::MultiSource
        } else {
            ResolutionMode::Priority
        }
    }

    /// Per-provider request deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Settings the builtin provider catalog is built from
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            api_endpoint: self.api_endpoint.clone(),
            timeout: self.request_timeout(),
            credentials: self.credentials.clone(),
        }
    }

    /// Settings the fusion engine is built from
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            mode: self.mode(),
            max_api_calls: self.max_api_calls,
            min_confidence_threshold: self.min_confidence_threshold,
            resolution_timeout: Duration::from_millis(self.resolution_timeout_ms),
            cache_key: DEFAULT_CACHE_KEY.to_string(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// Unset variables keep their defaults; unparseable numbers are
    /// `Error::Config`. The result is not validated.
    pub fn from_env() -> Result<Self, crate::Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, crate::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::new();

        if let Some(endpoint) = var("API_ENDPOINT") {
            config.api_endpoint = endpoint;
        }
        if let Some(ms) = parse_var(&var, "API_TIMEOUT")? {
            config.request_timeout_ms = ms;
        }
        if let Some(ms) = parse_var(&var, "RESOLUTION_TIMEOUT")? {
            config.resolution_timeout_ms = ms;
        }
        config.multi_source = var("ENABLE_MULTI_SOURCE").is_some_and(|v| v == "true");
        if let Some(threshold) = parse_var(&var, "MIN_CONFIDENCE_THRESHOLD")? {
            config.min_confidence_threshold = threshold;
        }
        if let Some(calls) = parse_var(&var, "MAX_API_CALLS")? {
            config.max_api_calls = calls;
        }

        config.cache.enabled = var("ENABLE_CACHE").is_none_or(|v| v != "false");
        if let Some(ttl) = parse_var(&var, "CACHE_TTL")? {
            config.cache.ttl_ms = ttl;
        }
        if let Some(path) = var("CACHE_FILE") {
            config.cache.path = path;
        }

        config.credentials = Credentials {
            amap_api_key: var("AMAP_API_KEY"),
            google_maps_api_key: var("GOOGLE_MAPS_API_KEY"),
            baidu_maps_api_key: var("BAIDU_MAPS_API_KEY"),
            ipinfo_token: var("IPINFO_TOKEN"),
            maxmind_api_key: var("MAXMIND_API_KEY"),
        };

        config.performance_monitoring =
            var("ENABLE_PERFORMANCE_MONITORING").is_none_or(|v| v != "false");

        Ok(config)
    }

    /// Config map with credentials redacted
    pub fn redacted(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(credentials) = value
            .get_mut("credentials")
            .and_then(serde_json::Value::as_object_mut)
        {
            for (_, secret) in credentials.iter_mut() {
                if !secret.is_null() {
                    *secret = serde_json::Value::String(REDACTED.to_string());
                }
            }
        }
        value
    }
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// How the engine chooses providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// Sequential fallback, stop at the first success
    #[default]
    Priority,
    /// Bounded concurrent fan-out with confidence-filtered fusion
    MultiSource,
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether the cache is consulted and written
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Entry lifetime (in milliseconds)
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,

    /// Path to the cache file
    #[serde(default = "default_cache_path")]
    pub path: String,
}

impl CacheConfig {
    /// Validate the cache configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.enabled && self.path.is_empty() {
            return Err(crate::Error::config("Cache file path cannot be empty"));
        }
        Ok(())
    }

    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: default_cache_ttl_ms(),
            path: default_cache_path(),
        }
    }
}

const REDACTED: &str = "<REDACTED>";

/// Provider credentials
///
/// The Debug implementation does not expose the secrets.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub amap_api_key: Option<String>,
    #[serde(default)]
    pub google_maps_api_key: Option<String>,
    #[serde(default)]
    pub baidu_maps_api_key: Option<String>,
    #[serde(default)]
    pub ipinfo_token: Option<String>,
    #[serde(default)]
    pub maxmind_api_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn mask(secret: &Option<String>) -> &'static str {
            if secret.is_some() { REDACTED } else { "<unset>" }
        }
        f.debug_struct("Credentials")
            .field("amap_api_key", &mask(&self.amap_api_key))
            .field("google_maps_api_key", &mask(&self.google_maps_api_key))
            .field("baidu_maps_api_key", &mask(&self.baidu_maps_api_key))
            .field("ipinfo_token", &mask(&self.ipinfo_token))
            .field("maxmind_api_key", &mask(&self.maxmind_api_key))
            .finish()
    }
}

/// Inputs of the builtin provider catalog
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_endpoint: String,
    pub timeout: Duration,
    pub credentials: Credentials,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        LocatorConfig::default().provider_settings()
    }
}

/// Key under which the engine caches its result
pub const DEFAULT_CACHE_KEY: &str = "location_optimal";

/// Fusion engine settings
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub mode: ResolutionMode,
    pub max_api_calls: usize,
    pub min_confidence_threshold: f64,
    pub resolution_timeout: Duration,
    pub cache_key: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        LocatorConfig::default().engine_settings()
    }
}

fn parse_var<T, F>(var: &F, key: &str) -> Result<Option<T>, crate::Error>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            crate::Error::config(format!("{} has an invalid value '{}': {}", key, raw, e))
        }),
    }
}

fn default_api_endpoint() -> String {
    "https://ipapi.co/json/".to_string()
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_resolution_timeout_ms() -> u64 {
    30_000
}

fn default_min_confidence_threshold() -> f64 {
    0.6
}

fn default_max_api_calls() -> usize {
    3
}

fn default_cache_ttl_ms() -> u64 {
    3_600_000
}

fn default_cache_path() -> String {
    "location_cache.json".to_string()
}

fn default_enabled() -> bool {
    true
}
