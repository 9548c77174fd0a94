//! Request parsing and response envelopes
//!
//! Input is at most one JSON object on stdin. Output is a single JSON
//! envelope: success on stdout, error on stderr.

use chrono::Utc;
use geofuse_core::metrics::MetricsSnapshot;
use geofuse_core::{Error, LocationRecord, LocatorConfig, suggestion_for};
use serde::Deserialize;
use serde_json::{Value, json};

const USAGE_NOTE: &str = "Multi-source geolocation service. Combines IP databases and map \
     services (IP, WiFi, GPS, cell) into one location with a confidence score.";

/// Commands besides resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    GetMetrics,
    ClearCache,
    GetConfig,
}

/// One invocation's request
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct LocatorRequest {
    /// `None` resolves the location
    #[serde(default)]
    pub command: Option<Command>,
}

/// Parse stdin
///
/// Empty input resolves. Anything but a JSON object, or an unknown command,
/// is `Error::InvalidInput`.
pub fn parse_request(input: &str) -> Result<LocatorRequest, Error> {
    if input.trim().is_empty() {
        return Ok(LocatorRequest::default());
    }

    let value: Value = serde_json::from_str(input)
        .map_err(|e| Error::invalid_input(format!("Malformed JSON: {}", e)))?;
    if !value.is_object() {
        return Err(Error::invalid_input("Request must be a JSON object"));
    }

    serde_json::from_value(value).map_err(|e| Error::invalid_input(e.to_string()))
}

/// Record with the usage note and, when given, the metrics attached
pub fn enrich(record: &LocationRecord, performance: Option<&MetricsSnapshot>) -> Result<Value, Error> {
    let mut value = serde_json::to_value(record)?;
    if let Some(object) = value.as_object_mut() {
        object.insert("_usage_note".to_string(), Value::String(USAGE_NOTE.to_string()));
        if let Some(snapshot) = performance {
            object.insert("_performance".to_string(), serde_json::to_value(snapshot)?);
        }
    }
    Ok(value)
}

pub fn success_envelope(result: Value) -> Value {
    json!({
        "status": "success",
        "result": result,
    })
}

/// Error envelope with diagnostics
///
/// `config` and `metrics` are included when the failure happened late
/// enough for them to exist.
pub fn error_envelope(
    error: &Error,
    config: Option<&LocatorConfig>,
    metrics: Option<&MetricsSnapshot>,
) -> Value {
    let headline = match error {
        Error::InvalidInput(_) => "Invalid JSON input received.",
        Error::Config(_) => "Invalid configuration.",
        _ => "Failed to fetch location data.",
    };

    let mut details = json!({
        "message": error.to_string(),
        "timestamp": Utc::now().to_rfc3339(),
    });
    if let Some(object) = details.as_object_mut() {
        if let Error::AllProvidersFailed { failures, .. } = error {
            object.insert("failures".to_string(), json!(failures));
        }
        if let Some(config) = config {
            object.insert("config".to_string(), config.redacted());
        }
        if let Some(snapshot) = metrics
            && let Ok(value) = serde_json::to_value(snapshot)
        {
            object.insert("metrics".to_string(), value);
        }
    }

    json!({
        "status": "error",
        "error": headline,
        "details": details,
        "suggestion": suggestion_for(error),
    })
}
