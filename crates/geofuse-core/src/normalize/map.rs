//! Map service providers
//!
//! These need a credential and report richer signals than the IP databases:
//! AMap answers with a bounding rectangle, Google with a multi-signal fix and
//! an accuracy radius, Baidu with a point in its own datum.

use serde::{Deserialize, Deserializer};

use super::{blank_record, decode, finish};
use crate::record::{ConfidenceLevel, LocationRecord, LocationType, non_empty};
use crate::traits::Normalizer;
use crate::{Error, Result};

/// Baseline score of the AMap IP service
pub const AMAP_BASELINE: f64 = 0.8;
/// Baseline score of the Google geolocation service
pub const GOOGLE_BASELINE: f64 = 0.9;
/// Baseline score of the Baidu location service
pub const BAIDU_BASELINE: f64 = 0.75;

/// AMap reports unknown text fields as `[]`
fn text_or_placeholder<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Field {
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Option::<Field>::deserialize(deserializer)? {
        Some(Field::Text(text)) => non_empty(Some(text)),
        Some(Field::Other(_)) | None => None,
    })
}

/// Baidu sends coordinates as strings
fn number_or_text<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Field {
        Number(f64),
        Text(String),
    }

    match Option::<Field>::deserialize(deserializer)? {
        Some(Field::Number(value)) => Ok(Some(value)),
        Some(Field::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Field::Text(text)) => text
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// AMap IP location (`restapi.amap.com/v3/ip`)
#[derive(Debug, Default, Clone, Copy)]
pub struct AmapNormalizer;

#[derive(Deserialize)]
struct AmapBody {
    status: Option<String>,
    #[serde(default, deserialize_with = "text_or_placeholder")]
    info: Option<String>,
    #[serde(default, deserialize_with = "text_or_placeholder")]
    province: Option<String>,
    #[serde(default, deserialize_with = "text_or_placeholder")]
    city: Option<String>,
    #[serde(default, deserialize_with = "text_or_placeholder")]
    adcode: Option<String>,
    /// "lon1,lat1;lon2,lat2"
    #[serde(default, deserialize_with = "text_or_placeholder")]
    rectangle: Option<String>,
}

/// Centre of an AMap rectangle as (latitude, longitude)
fn rectangle_centre(provider: &str, rectangle: &str) -> Result<(f64, f64)> {
    let malformed = || Error::parse(provider, format!("malformed rectangle: {}", rectangle));

    let corner = |text: &str| -> Result<(f64, f64)> {
        let (lon, lat) = text.split_once(',').ok_or_else(malformed)?;
        let lon = lon.trim().parse::<f64>().map_err(|_| malformed())?;
        let lat = lat.trim().parse::<f64>().map_err(|_| malformed())?;
        Ok((lat, lon))
    };

    let (start, end) = rectangle.split_once(';').ok_or_else(malformed)?;
    let (lat1, lon1) = corner(start)?;
    let (lat2, lon2) = corner(end)?;
    Ok(((lat1 + lat2) / 2.0, (lon1 + lon2) / 2.0))
}

impl Normalizer for AmapNormalizer {
    fn normalize(&self, provider: &str, raw: &[u8]) -> Result<LocationRecord> {
        let body: AmapBody = decode(provider, raw)?;
        if body.status.as_deref() != Some("1") {
            return Err(Error::parse(
                provider,
                format!(
                    "provider error: {}",
                    body.info.as_deref().unwrap_or("unknown")
                ),
            ));
        }

        // Addresses outside AMap's coverage come back as "1" with `[]` fields
        let Some(rectangle) = body.rectangle else {
            return Err(Error::parse(provider, "no location data"));
        };
        let (lat, lon) = rectangle_centre(provider, &rectangle)?;

        let mut record = blank_record(
            provider,
            LocationType::Ip,
            "AMap IP API",
            ConfidenceLevel::Medium,
            AMAP_BASELINE,
            &["AMap IP location", "Precision: city level"],
        );
        record.country = Some("China".to_string());
        record.country_code = Some("CN".to_string());
        record.region = body.province;
        record.region_code = body.adcode;
        record.city = body.city;
        record.latitude = Some(lat);
        record.longitude = Some(lon);

        finish(provider, record, AMAP_BASELINE)
    }
}

/// Google Maps Geolocation API
#[derive(Debug, Default, Clone, Copy)]
pub struct GoogleGeolocationNormalizer;

#[derive(Deserialize)]
struct GoogleBody {
    location: Option<GoogleLocation>,
    accuracy: Option<f64>,
    error: Option<GoogleError>,
}

#[derive(Deserialize)]
struct GoogleLocation {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct GoogleError {
    message: Option<String>,
}

impl Normalizer for GoogleGeolocationNormalizer {
    fn normalize(&self, provider: &str, raw: &[u8]) -> Result<LocationRecord> {
        let body: GoogleBody = decode(provider, raw)?;
        let location = match body.location {
            Some(location) => location,
            None => {
                let reason = body
                    .error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "no location data".to_string());
                return Err(Error::parse(provider, reason));
            }
        };

        let mut record = blank_record(
            provider,
            LocationType::WifiGpsCell,
            "Google Maps Geolocation API",
            ConfidenceLevel::High,
            GOOGLE_BASELINE,
            &[
                "Google multi-signal geolocation",
                "Signals: WiFi, GPS, cell",
                "Precision: 10-100 m",
            ],
        );
        record.latitude = Some(location.lat);
        record.longitude = Some(location.lng);
        record.accuracy = body.accuracy;

        finish(provider, record, GOOGLE_BASELINE)
    }
}

/// Baidu IP location (`api.map.baidu.com/location/ip`)
#[derive(Debug, Default, Clone, Copy)]
pub struct BaiduNormalizer;

#[derive(Deserialize)]
struct BaiduBody {
    status: Option<i64>,
    message: Option<String>,
    content: Option<BaiduContent>,
}

#[derive(Deserialize)]
struct BaiduContent {
    point: Option<BaiduPoint>,
    address_detail: Option<BaiduAddress>,
}

#[derive(Deserialize)]
struct BaiduPoint {
    #[serde(default, deserialize_with = "number_or_text")]
    x: Option<f64>,
    #[serde(default, deserialize_with = "number_or_text")]
    y: Option<f64>,
}

#[derive(Deserialize)]
struct BaiduAddress {
    city: Option<String>,
    province: Option<String>,
}

impl Normalizer for BaiduNormalizer {
    fn normalize(&self, provider: &str, raw: &[u8]) -> Result<LocationRecord> {
        let body: BaiduBody = decode(provider, raw)?;
        let content = match (body.status, body.content) {
            (Some(0), Some(content)) => content,
            _ => {
                return Err(Error::parse(
                    provider,
                    format!(
                        "provider error: {}",
                        body.message.as_deref().unwrap_or("unknown")
                    ),
                ));
            }
        };

        let mut record = blank_record(
            provider,
            LocationType::IpWifi,
            "Baidu Maps API",
            ConfidenceLevel::Medium,
            BAIDU_BASELINE,
            &[
                "Baidu location",
                "Signals: WiFi, IP",
                "Precision: city level",
            ],
        );
        record.country = Some("China".to_string());
        record.country_code = Some("CN".to_string());
        if let Some(point) = content.point {
            record.latitude = point.y;
            record.longitude = point.x;
        }
        if let Some(address) = content.address_detail {
            record.city = non_empty(address.city);
            record.region = non_empty(address.province);
        }

        finish(provider, record, BAIDU_BASELINE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amap_rectangle_centre() {
        let raw = r#"{
            "status": "1",
            "info": "OK",
            "infocode": "10000",
            "province": "Beijing",
            "city": "Beijing",
            "adcode": "110000",
            "rectangle": "116.0,39.0;117.0,40.0"
        }"#;

        let record = AmapNormalizer.normalize("amap_ip", raw.as_bytes()).unwrap();
        assert_eq!(record.coordinates(), Some((39.5, 116.5)));
        assert_eq!(record.region_code.as_deref(), Some("110000"));
        assert_eq!(record.country_code.as_deref(), Some("CN"));
        assert_eq!(record.metadata.source_api, "AMap IP API");
        assert!((record.metadata.confidence_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_amap_outside_coverage_is_rejected() {
        let raw = br#"{
            "status": "1",
            "info": "OK",
            "infocode": "10000",
            "province": [],
            "city": [],
            "adcode": [],
            "rectangle": []
        }"#;

        let err = AmapNormalizer.normalize("amap_ip", raw).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().contains("no location data"));
    }

    #[test]
    fn test_amap_missing_rectangle_is_rejected() {
        let raw = br#"{"status": "1", "info": "OK", "province": "Beijing"}"#;
        assert!(matches!(
            AmapNormalizer.normalize("amap_ip", raw),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_amap_placeholder_city_with_rectangle() {
        let raw = br#"{
            "status": "1",
            "province": "Beijing",
            "city": [],
            "adcode": "110000",
            "rectangle": "116.0,39.0;117.0,40.0"
        }"#;

        let record = AmapNormalizer.normalize("amap_ip", raw).unwrap();
        assert_eq!(record.city, None);
        assert_eq!(record.region.as_deref(), Some("Beijing"));
        assert_eq!(record.coordinates(), Some((39.5, 116.5)));
    }

    #[test]
    fn test_amap_error_status() {
        let raw = br#"{"status": "0", "info": "INVALID_USER_KEY", "infocode": "10001"}"#;
        let err = AmapNormalizer.normalize("amap_ip", raw).unwrap_err();
        assert!(err.to_string().contains("INVALID_USER_KEY"));
    }

    #[test]
    fn test_amap_malformed_rectangle() {
        let raw = br#"{"status": "1", "rectangle": "116.0;117.0"}"#;
        assert!(matches!(
            AmapNormalizer.normalize("amap_ip", raw),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_google_location() {
        let raw = br#"{"location": {"lat": 37.42, "lng": -122.08}, "accuracy": 35.5}"#;

        let record = GoogleGeolocationNormalizer
            .normalize("google_maps", raw)
            .unwrap();
        assert_eq!(record.location_type, LocationType::WifiGpsCell);
        assert_eq!(record.accuracy, Some(35.5));
        assert_eq!(record.metadata.confidence, ConfidenceLevel::High);
        assert!((record.metadata.confidence_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_google_missing_location() {
        let raw = br#"{"error": {"code": 403, "message": "API key not valid"}}"#;
        let err = GoogleGeolocationNormalizer
            .normalize("google_maps", raw)
            .unwrap_err();
        assert!(err.to_string().contains("API key not valid"));
    }

    #[test]
    fn test_baidu_string_coordinates() {
        let raw = r#"{
            "address": "CN|Beijing|Beijing|None|CHINANET|1|None",
            "content": {
                "address": "Beijing",
                "address_detail": {"city": "Beijing", "city_code": 131, "province": "Beijing"},
                "point": {"x": "116.40387397", "y": "39.91488908"}
            },
            "status": 0
        }"#;

        let record = BaiduNormalizer.normalize("baidu_maps", raw.as_bytes()).unwrap();
        assert_eq!(record.location_type, LocationType::IpWifi);
        assert_eq!(record.coordinates(), Some((39.91488908, 116.40387397)));
        assert_eq!(record.city.as_deref(), Some("Beijing"));
    }

    #[test]
    fn test_baidu_error_status() {
        let raw = br#"{"status": 1, "message": "Internal Service Error"}"#;
        assert!(matches!(
            BaiduNormalizer.normalize("baidu_maps", raw),
            Err(Error::Parse { .. })
        ));
    }
}
