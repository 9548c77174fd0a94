// # geofuse - Location Resolver
//
// Thin integration layer over geofuse-core. One invocation answers one
// request:
// 1. Read configuration from environment variables
// 2. Read one JSON request from stdin
// 3. Compose registry, client, cache and engine
// 4. Resolve (or run a command) and print one JSON envelope
//
// ## Configuration
//
// ### Providers
// - `API_ENDPOINT`: Endpoint of the primary IP provider
// - `API_TIMEOUT`: Per-provider deadline in milliseconds
// - `AMAP_API_KEY`, `GOOGLE_MAPS_API_KEY`, `BAIDU_MAPS_API_KEY`: Map service keys
// - `IPINFO_TOKEN`: ipinfo.io token (optional)
//
// ### Resolution
// - `ENABLE_MULTI_SOURCE`: `true` fuses several providers
// - `MIN_CONFIDENCE_THRESHOLD`: Minimum score to take part in fusion
// - `MAX_API_CALLS`: Providers queried in multi-source mode
// - `RESOLUTION_TIMEOUT`: Deadline of a whole resolution in milliseconds
//
// ### Cache
// - `ENABLE_CACHE`: `false` disables the cache
// - `CACHE_TTL`: Entry lifetime in milliseconds
// - `CACHE_FILE`: Path of the cache file
//
// ### Output
// - `ENABLE_PERFORMANCE_MONITORING`: `false` omits `_performance`
// - `LOG_LEVEL`: trace, debug, info, warn, error (logs go to stderr)
//
// ## Example
//
// ```bash
// export ENABLE_MULTI_SOURCE=true
// export CACHE_FILE=/var/cache/geofuse/location.json
//
// echo '{}' | geofuse
// echo '{"command": "clearCache"}' | geofuse
// ```

mod protocol;

use anyhow::Context;
use geofuse_core::traits::CacheStore;
use geofuse_core::{
    Error, FileCacheStore, FusionEngine, LocatorConfig, MemoryCacheStore, MetricsCollector,
    ProviderClient, ProviderRegistry,
};
use geofuse_http::ReqwestTransport;
use protocol::{Command, LocatorRequest};
use serde_json::{Value, json};
use std::env;
use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GeofuseExitCode {
    /// Request answered
    Success = 0,
    /// Configuration error or invalid input
    ConfigError = 1,
    /// Resolution failure or runtime error
    RuntimeError = 2,
}

impl GeofuseExitCode {
    fn for_error(error: &Error) -> Self {
        match error {
            Error::Config(_) | Error::InvalidInput(_) => Self::ConfigError,
            _ => Self::RuntimeError,
        }
    }
}

impl From<GeofuseExitCode> for ExitCode {
    fn from(code: GeofuseExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn parse_log_level(raw: Option<String>) -> Result<Level, Error> {
    let raw = raw.unwrap_or_else(|| "warn".to_string());
    match raw.trim().to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(Error::config(format!(
            "LOG_LEVEL '{}' is not valid. Valid levels: trace, debug, info, warn, error",
            raw
        ))),
    }
}

/// Print an error envelope and pick the exit code
fn fail(
    error: &Error,
    config: Option<&LocatorConfig>,
    metrics: Option<&MetricsCollector>,
) -> ExitCode {
    let snapshot = metrics.map(MetricsCollector::snapshot);
    let envelope = protocol::error_envelope(error, config, snapshot.as_ref());
    eprintln!("{}", envelope);
    GeofuseExitCode::for_error(error).into()
}

fn read_stdin() -> anyhow::Result<String> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read request from stdin")?;
    Ok(input)
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match LocatorConfig::from_env().and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => return fail(&e, None, None),
    };

    let log_level = match parse_log_level(env::var("LOG_LEVEL").ok()) {
        Ok(level) => level,
        Err(e) => return fail(&e, None, None),
    };

    // stdout carries the response only
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        return fail(
            &Error::config(format!("Failed to set tracing subscriber: {}", e)),
            None,
            None,
        );
    }

    let input = match read_stdin() {
        Ok(input) => input,
        Err(e) => return fail(&Error::from(e), Some(&config), None),
    };

    let request = match protocol::parse_request(&input) {
        Ok(request) => request,
        Err(e) => return fail(&e, Some(&config), None),
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return fail(&Error::Io(e), Some(&config), None);
        }
    };

    let metrics = Arc::new(MetricsCollector::new());
    match rt.block_on(run(&config, request, Arc::clone(&metrics))) {
        Ok(result) => {
            println!("{}", protocol::success_envelope(result));
            GeofuseExitCode::Success.into()
        }
        Err(e) => {
            error!("Location request failed: {}", e);
            fail(&e, Some(&config), Some(metrics.as_ref()))
        }
    }
}

/// Answer one request
async fn run(
    config: &LocatorConfig,
    request: LocatorRequest,
    metrics: Arc<MetricsCollector>,
) -> Result<Value, Error> {
    match request.command {
        Some(Command::GetConfig) => return Ok(config.redacted()),
        Some(Command::GetMetrics) => return Ok(serde_json::to_value(metrics.snapshot())?),
        Some(Command::ClearCache) => {
            clear_cache(config).await?;
            return Ok(json!({ "message": "Cache cleared successfully" }));
        }
        None => {}
    }

    let registry = ProviderRegistry::with_builtin_providers(&config.provider_settings());
    info!(
        "Active providers: {:?}",
        registry
            .active_providers()
            .iter()
            .map(|p| p.spec.name.as_str())
            .collect::<Vec<_>>()
    );

    let transport = Arc::new(ReqwestTransport::new()?);
    let client = ProviderClient::new(transport, Arc::clone(&metrics));
    let cache = open_cache(config).await;
    let engine = FusionEngine::new(Arc::new(registry), client, cache, config.engine_settings());

    let record = engine.resolve().await?;
    let performance = config.performance_monitoring.then(|| metrics.snapshot());
    protocol::enrich(&record, performance.as_ref())
}

/// Cache store per configuration
///
/// An unusable cache file degrades to an in-memory cache.
async fn open_cache(config: &LocatorConfig) -> Option<Arc<dyn CacheStore>> {
    if !config.cache.enabled {
        return None;
    }

    match FileCacheStore::open(&config.cache.path, config.cache.ttl()).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!("Cache file unavailable, caching in memory only: {}", e);
            Some(Arc::new(MemoryCacheStore::new(config.cache.ttl())))
        }
    }
}

/// Empty the cache file, whether or not caching is enabled
async fn clear_cache(config: &LocatorConfig) -> Result<(), Error> {
    if config.cache.path.is_empty() {
        return Ok(());
    }
    let store = FileCacheStore::open(&config.cache.path, config.cache.ttl()).await?;
    store.clear().await?;
    info!("Cleared cache file {}", store.path().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_default_is_warn() {
        assert_eq!(parse_log_level(None).unwrap(), Level::WARN);
        assert_eq!(parse_log_level(Some("DEBUG".into())).unwrap(), Level::DEBUG);
        assert!(matches!(
            parse_log_level(Some("loud".into())),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            GeofuseExitCode::for_error(&Error::invalid_input("x")),
            GeofuseExitCode::ConfigError
        );
        assert_eq!(
            GeofuseExitCode::for_error(&Error::config("x")),
            GeofuseExitCode::ConfigError
        );
        assert_eq!(
            GeofuseExitCode::for_error(&Error::AllProvidersFailed {
                attempted: 0,
                failures: Vec::new()
            }),
            GeofuseExitCode::RuntimeError
        );
    }

    #[tokio::test]
    async fn test_commands_skip_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LocatorConfig::default();
        config.cache.path = dir.path().join("cache.json").display().to_string();
        let metrics = Arc::new(MetricsCollector::new());

        let value = run(
            &config,
            LocatorRequest {
                command: Some(Command::GetMetrics),
            },
            Arc::clone(&metrics),
        )
        .await
        .unwrap();
        assert_eq!(value["totalRequests"], 0);

        let value = run(
            &config,
            LocatorRequest {
                command: Some(Command::ClearCache),
            },
            Arc::clone(&metrics),
        )
        .await
        .unwrap();
        assert_eq!(value["message"], "Cache cleared successfully");
        assert!(dir.path().join("cache.json").exists());

        let value = run(
            &config,
            LocatorRequest {
                command: Some(Command::GetConfig),
            },
            metrics,
        )
        .await
        .unwrap();
        assert_eq!(value["max_api_calls"], 3);
    }
}
