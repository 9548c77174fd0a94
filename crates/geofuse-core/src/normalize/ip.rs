//! IP database providers
//!
//! All four answer a plain GET with the caller's public address resolved to a
//! city-level location. A response without a coordinate pair is useless for
//! geolocation and is rejected.

use serde::Deserialize;

use super::{IP_BASELINE, blank_record, decode, finish};
use crate::record::{ConfidenceLevel, LocationRecord, LocationType, non_empty};
use crate::traits::Normalizer;
use crate::{Error, Result};

const IP_NOTES: &[&str] = &["IP geolocation", "Precision: city level"];

fn ip_record(provider: &str) -> LocationRecord {
    blank_record(
        provider,
        LocationType::Ip,
        provider,
        ConfidenceLevel::Medium,
        IP_BASELINE,
        IP_NOTES,
    )
}

fn finish_ip(provider: &str, record: LocationRecord) -> Result<LocationRecord> {
    if record.latitude.is_none() && record.longitude.is_none() {
        return Err(Error::parse(provider, "no valid coordinates"));
    }
    finish(provider, record, IP_BASELINE)
}

/// ipapi.co
#[derive(Debug, Default, Clone, Copy)]
pub struct IpapiCoNormalizer;

#[derive(Deserialize)]
struct IpapiCoBody {
    #[serde(default)]
    error: bool,
    reason: Option<String>,
    ip: Option<String>,
    country_name: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
    region: Option<String>,
    region_code: Option<String>,
    city: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    org: Option<String>,
    timezone: Option<String>,
}

impl Normalizer for IpapiCoNormalizer {
    fn normalize(&self, provider: &str, raw: &[u8]) -> Result<LocationRecord> {
        let body: IpapiCoBody = decode(provider, raw)?;
        if body.error {
            return Err(Error::parse(
                provider,
                format!(
                    "provider error: {}",
                    body.reason.as_deref().unwrap_or("unknown")
                ),
            ));
        }

        let mut record = ip_record(provider);
        record.ip = non_empty(body.ip);
        record.country = non_empty(body.country_name).or_else(|| non_empty(body.country));
        record.country_code = non_empty(body.country_code);
        record.region = non_empty(body.region);
        record.region_code = non_empty(body.region_code);
        record.city = non_empty(body.city);
        record.latitude = body.latitude;
        record.longitude = body.longitude;
        record.org = non_empty(body.org);
        record.isp = record.org.clone();
        record.timezone = non_empty(body.timezone);

        finish_ip(provider, record)
    }
}

/// ipwho.is
#[derive(Debug, Default, Clone, Copy)]
pub struct IpwhoIsNormalizer;

#[derive(Deserialize)]
struct IpwhoIsBody {
    success: Option<bool>,
    message: Option<String>,
    ip: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
    region: Option<String>,
    region_code: Option<String>,
    city: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    connection: Option<IpwhoIsConnection>,
    isp: Option<String>,
    org: Option<String>,
    timezone: Option<IpwhoIsTimezone>,
}

#[derive(Deserialize)]
struct IpwhoIsConnection {
    isp: Option<String>,
    org: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IpwhoIsTimezone {
    Object { id: Option<String> },
    Name(String),
}

impl Normalizer for IpwhoIsNormalizer {
    fn normalize(&self, provider: &str, raw: &[u8]) -> Result<LocationRecord> {
        let body: IpwhoIsBody = decode(provider, raw)?;
        if body.success == Some(false) {
            return Err(Error::parse(
                provider,
                format!(
                    "provider error: {}",
                    body.message.as_deref().unwrap_or("unknown")
                ),
            ));
        }

        let (conn_isp, conn_org) = match body.connection {
            Some(conn) => (conn.isp, conn.org),
            None => (None, None),
        };

        let mut record = ip_record(provider);
        record.ip = non_empty(body.ip);
        record.country = non_empty(body.country);
        record.country_code = non_empty(body.country_code);
        record.region = non_empty(body.region);
        record.region_code = non_empty(body.region_code);
        record.city = non_empty(body.city);
        record.latitude = body.latitude;
        record.longitude = body.longitude;
        record.isp = non_empty(conn_isp).or_else(|| non_empty(body.isp));
        record.org = non_empty(conn_org).or_else(|| non_empty(body.org));
        record.timezone = match body.timezone {
            Some(IpwhoIsTimezone::Object { id }) => non_empty(id),
            Some(IpwhoIsTimezone::Name(name)) => non_empty(Some(name)),
            None => None,
        };

        finish_ip(provider, record)
    }
}

/// ipinfo.io
///
/// Only ISO codes are reported, so `country`/`country_code` and
/// `region`/`region_code` carry the same values.
#[derive(Debug, Default, Clone, Copy)]
pub struct IpinfoIoNormalizer;

#[derive(Deserialize)]
struct IpinfoIoBody {
    ip: Option<String>,
    country: Option<String>,
    region: Option<String>,
    city: Option<String>,
    /// "lat,lon"
    loc: Option<String>,
    org: Option<String>,
    timezone: Option<String>,
    error: Option<serde_json::Value>,
}

fn parse_loc(provider: &str, loc: &str) -> Result<(f64, f64)> {
    let (lat, lon) = loc
        .split_once(',')
        .ok_or_else(|| Error::parse(provider, format!("malformed loc: {}", loc)))?;
    let parse = |value: &str| {
        value
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::parse(provider, format!("malformed loc: {}", loc)))
    };
    Ok((parse(lat)?, parse(lon)?))
}

impl Normalizer for IpinfoIoNormalizer {
    fn normalize(&self, provider: &str, raw: &[u8]) -> Result<LocationRecord> {
        let body: IpinfoIoBody = decode(provider, raw)?;
        if let Some(error) = body.error {
            return Err(Error::parse(provider, format!("provider error: {}", error)));
        }

        let mut record = ip_record(provider);
        record.ip = non_empty(body.ip);
        record.country = non_empty(body.country);
        record.country_code = record.country.clone();
        record.region = non_empty(body.region);
        record.region_code = record.region.clone();
        record.city = non_empty(body.city);
        if let Some(loc) = non_empty(body.loc) {
            let (lat, lon) = parse_loc(provider, &loc)?;
            record.latitude = Some(lat);
            record.longitude = Some(lon);
        }
        record.org = non_empty(body.org);
        record.isp = record.org.clone();
        record.timezone = non_empty(body.timezone);

        finish_ip(provider, record)
    }
}

/// ip-api.com
#[derive(Debug, Default, Clone, Copy)]
pub struct IpApiComNormalizer;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiComBody {
    status: Option<String>,
    message: Option<String>,
    query: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
    region_name: Option<String>,
    region: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    isp: Option<String>,
    org: Option<String>,
    timezone: Option<String>,
}

impl Normalizer for IpApiComNormalizer {
    fn normalize(&self, provider: &str, raw: &[u8]) -> Result<LocationRecord> {
        let body: IpApiComBody = decode(provider, raw)?;
        if body.status.as_deref() == Some("fail") {
            return Err(Error::parse(
                provider,
                format!(
                    "provider error: {}",
                    body.message.as_deref().unwrap_or("unknown")
                ),
            ));
        }

        let mut record = ip_record(provider);
        record.ip = non_empty(body.query);
        record.country = non_empty(body.country);
        record.country_code = non_empty(body.country_code);
        record.region = non_empty(body.region_name);
        record.region_code = non_empty(body.region);
        record.city = non_empty(body.city);
        record.latitude = body.lat;
        record.longitude = body.lon;
        record.isp = non_empty(body.isp);
        record.org = non_empty(body.org);
        record.timezone = non_empty(body.timezone);

        finish_ip(provider, record)
    }
}
