//! Common location record produced by every normalizer and by fusion
//!
//! Wire names are snake_case with provenance under `_metadata`; the cache
//! file and the CLI output share this shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `source` value of a fused record
pub const FUSION_SOURCE: &str = "multi_source_fusion";

/// How the provider located the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationType {
    #[serde(rename = "ip")]
    Ip,
    #[serde(rename = "wifi")]
    Wifi,
    #[serde(rename = "wifi/gps/cell")]
    WifiGpsCell,
    #[serde(rename = "ip/wifi")]
    IpWifi,
}

/// Coarse confidence bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// One contributor to a fused record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualResult {
    pub source: String,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
}

/// Provenance and confidence of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub source_api: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: ConfidenceLevel,
    pub confidence_score: f64,
    #[serde(default)]
    pub accuracy_notes: Vec<String>,
    /// Present only on fused records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub individual_results: Option<Vec<IndividualResult>>,
}

/// A location as reported by one provider, or fused from several
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Accuracy radius in metres, when the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub location_type: LocationType,
    pub source: String,
    #[serde(rename = "_metadata")]
    pub metadata: Metadata,
}

impl LocationRecord {
    /// Create an empty record for `source`
    pub fn new(source: impl Into<String>, location_type: LocationType, metadata: Metadata) -> Self {
        Self {
            ip: None,
            country: None,
            country_code: None,
            region: None,
            region_code: None,
            city: None,
            latitude: None,
            longitude: None,
            accuracy: None,
            isp: None,
            org: None,
            timezone: None,
            location_type,
            source: source.into(),
            metadata,
        }
    }

    /// Both coordinates, if the record carries a pair
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    /// Coordinates are either absent together, or present, finite and in range
    pub fn has_valid_coordinates(&self) -> bool {
        match (self.latitude, self.longitude) {
            (None, None) => true,
            (Some(lat), Some(lon)) => {
                lat.is_finite()
                    && lon.is_finite()
                    && (-90.0..=90.0).contains(&lat)
                    && (-180.0..=180.0).contains(&lon)
            }
            _ => false,
        }
    }

    /// Reject records that must not reach fusion or the cache
    pub fn validate(&self) -> Result<(), String> {
        if !self.has_valid_coordinates() {
            return Err(format!(
                "invalid coordinates (latitude={:?}, longitude={:?})",
                self.latitude, self.longitude
            ));
        }
        let score = self.metadata.confidence_score;
        if !(0.0..=1.0).contains(&score) {
            return Err(format!("confidence score out of range: {}", score));
        }
        Ok(())
    }

    /// Number of populated non-metadata fields
    ///
    /// `location_type` and `source` are always present and count for every
    /// record alike.
    pub fn populated_field_count(&self) -> usize {
        let optional = [
            self.ip.is_some(),
            self.country.is_some(),
            self.country_code.is_some(),
            self.region.is_some(),
            self.region_code.is_some(),
            self.city.is_some(),
            self.latitude.is_some(),
            self.longitude.is_some(),
            self.accuracy.is_some(),
            self.isp.is_some(),
            self.org.is_some(),
            self.timezone.is_some(),
        ];
        2 + optional.iter().filter(|present| **present).count()
    }
}

/// Treat empty or whitespace-only strings as missing
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == v.len() {
            Some(v)
        } else {
            Some(trimmed.to_string())
        }
    })
}
