// # Result Normalizers
//
// One `Normalizer` per known provider response shape. Each maps the raw body
// to a `LocationRecord`, stamps provenance metadata and stores the
// completeness-adjusted confidence.
//
// ## Providers
//
// - IP databases: ipapi.co, ipwho.is, ipinfo.io, ip-api.com (`ip`)
// - Map services: AMap, Google geolocation, Baidu (`map`)

pub mod confidence;
pub mod ip;
pub mod map;

pub use confidence::calculate_confidence;
pub use ip::{IpApiComNormalizer, IpapiCoNormalizer, IpinfoIoNormalizer, IpwhoIsNormalizer};
pub use map::{AmapNormalizer, BaiduNormalizer, GoogleGeolocationNormalizer};

use chrono::Utc;
use serde::de::DeserializeOwned;

use crate::record::{ConfidenceLevel, LocationRecord, LocationType, Metadata};
use crate::{Error, Result};

/// Baseline score of the IP database providers
pub const IP_BASELINE: f64 = 0.6;

/// Decode a provider body, attributing failures to `provider`
fn decode<T: DeserializeOwned>(provider: &str, raw: &[u8]) -> Result<T> {
    serde_json::from_slice(raw)
        .map_err(|e| Error::parse(provider, format!("malformed response: {}", e)))
}

/// Empty record with provenance metadata
fn blank_record(
    provider: &str,
    location_type: LocationType,
    source_api: &str,
    level: ConfidenceLevel,
    baseline: f64,
    accuracy_notes: &[&str],
) -> LocationRecord {
    LocationRecord::new(
        provider,
        location_type,
        Metadata {
            source_api: source_api.to_string(),
            timestamp: Utc::now(),
            confidence: level,
            confidence_score: baseline,
            accuracy_notes: accuracy_notes.iter().map(|note| note.to_string()).collect(),
            individual_results: None,
        },
    )
}

/// Apply the completeness adjustment and enforce the record invariants
fn finish(provider: &str, mut record: LocationRecord, baseline: f64) -> Result<LocationRecord> {
    record.metadata.confidence_score = calculate_confidence(&record, baseline);
    record
        .validate()
        .map_err(|reason| Error::parse(provider, reason))?;
    tracing::trace!(
        "{} normalized with confidence {:.2}",
        provider,
        record.metadata.confidence_score
    );
    Ok(record)
}
