//! Builtin provider catalog

use std::sync::Arc;

use super::{ProviderKind, ProviderRegistry, ProviderSpec};
use crate::config::ProviderSettings;
use crate::normalize::{
    AmapNormalizer, BaiduNormalizer, GoogleGeolocationNormalizer, IpApiComNormalizer,
    IpapiCoNormalizer, IpinfoIoNormalizer, IpwhoIsNormalizer,
};
use crate::traits::{HttpMethod, Normalizer};

const AMAP_ENDPOINT: &str = "https://restapi.amap.com/v3/ip?key={key}&output=json";
const GOOGLE_ENDPOINT: &str = "https://www.googleapis.com/geolocation/v1/geolocate?key={key}";
const BAIDU_ENDPOINT: &str = "https://api.map.baidu.com/location/ip?ak={key}&coor=bd09ll";
const IPWHO_ENDPOINT: &str = "https://ipwho.is/";
const IPINFO_ENDPOINT: &str = "https://ipinfo.io/json";
const IP_API_ENDPOINT: &str = "http://ip-api.com/json/";

impl ProviderRegistry {
    /// Registry with the seven known providers
    ///
    /// Map services are registered before IP databases, so at equal priority
    /// a configured map service is tried first.
    pub fn with_builtin_providers(settings: &ProviderSettings) -> Self {
        let timeout = settings.timeout;
        let credentials = &settings.credentials;

        let catalog: Vec<(ProviderSpec, Arc<dyn Normalizer>)> = vec![
            (
                ProviderSpec::new("amap_ip", ProviderKind::Map, 1, AMAP_ENDPOINT, timeout)
                    .with_credential(credentials.amap_api_key.clone()),
                Arc::new(AmapNormalizer),
            ),
            (
                ProviderSpec::new("google_maps", ProviderKind::Map, 2, GOOGLE_ENDPOINT, timeout)
                    .with_method(HttpMethod::Post(serde_json::json!({ "considerIp": true })))
                    .with_credential(credentials.google_maps_api_key.clone()),
                Arc::new(GoogleGeolocationNormalizer),
            ),
            (
                ProviderSpec::new("baidu_maps", ProviderKind::Map, 3, BAIDU_ENDPOINT, timeout)
                    .with_credential(credentials.baidu_maps_api_key.clone()),
                Arc::new(BaiduNormalizer),
            ),
            (
                ProviderSpec::new(
                    "ipapi_co",
                    ProviderKind::Ip,
                    1,
                    settings.api_endpoint.clone(),
                    timeout,
                ),
                Arc::new(IpapiCoNormalizer),
            ),
            (
                ProviderSpec::new("ipwho_is", ProviderKind::Ip, 2, IPWHO_ENDPOINT, timeout),
                Arc::new(IpwhoIsNormalizer),
            ),
            (
                ProviderSpec::new("ipinfo_io", ProviderKind::Ip, 3, IPINFO_ENDPOINT, timeout)
                    .with_credential(credentials.ipinfo_token.clone())
                    .with_credential_param("token"),
                Arc::new(IpinfoIoNormalizer),
            ),
            (
                ProviderSpec::new("ip_api_com", ProviderKind::Ip, 4, IP_API_ENDPOINT, timeout),
                Arc::new(IpApiComNormalizer),
            ),
        ];

        let mut registry = ProviderRegistry::new();
        for (spec, normalizer) in catalog {
            let name = spec.name.clone();
            // Names are distinct and settings were validated upstream
            if let Err(e) = registry.register(spec, normalizer) {
                tracing::warn!("Skipping builtin provider {}: {}", name, e);
            }
        }
        registry
    }
}
