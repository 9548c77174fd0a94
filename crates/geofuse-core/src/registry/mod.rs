//! Provider registry
//!
//! The registry holds every known location provider together with the
//! normalizer for its response shape, so adding a provider means registering
//! a spec and a `Normalizer`, never editing a dispatch chain.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use geofuse_core::registry::{ProviderKind, ProviderRegistry, ProviderSpec};
//! use std::sync::Arc;
//!
//! let mut registry = ProviderRegistry::new();
//! registry.register(
//!     ProviderSpec::new("ipwho_is", ProviderKind::Ip, 2, "https://ipwho.is/", timeout),
//!     Arc::new(IpwhoIsNormalizer),
//! )?;
//!
//! for provider in registry.active_providers() {
//!     // call in order
//! }
//! ```

mod builtin;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::traits::{HttpMethod, Normalizer, ProviderRequest};

/// Placeholder substituted with the credential
const KEY_PLACEHOLDER: &str = "{key}";

/// Provider category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// IP geolocation database
    Ip,
    /// Map service; only active with a credential
    Map,
}

/// Static description of one provider
#[derive(Clone)]
pub struct ProviderSpec {
    /// Unique within a registry
    pub name: String,
    pub kind: ProviderKind,
    /// Lower is tried first
    pub priority: u32,
    /// URL, optionally with a `{key}` placeholder
    pub endpoint_template: String,
    pub method: HttpMethod,
    /// Per-call deadline
    pub timeout: Duration,
    pub credential: Option<String>,
    /// Query parameter carrying the credential when the template has no placeholder
    pub credential_param: Option<String>,
}

impl fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("endpoint_template", &self.endpoint_template)
            .field("method", &self.method)
            .field("timeout", &self.timeout)
            .field(
                "credential",
                &self.credential.as_ref().map(|_| "<REDACTED>"),
            )
            .field("credential_param", &self.credential_param)
            .finish()
    }
}

impl ProviderSpec {
    /// Create a GET provider without credential
    pub fn new(
        name: impl Into<String>,
        kind: ProviderKind,
        priority: u32,
        endpoint_template: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            priority,
            endpoint_template: endpoint_template.into(),
            method: HttpMethod::Get,
            timeout,
            credential: None,
            credential_param: None,
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Empty credentials count as unset
    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_credential_param(mut self, param: impl Into<String>) -> Self {
        self.credential_param = Some(param.into());
        self
    }

    /// Whether the provider can be called with its current settings
    pub fn is_usable(&self) -> bool {
        match self.kind {
            ProviderKind::Ip => true,
            ProviderKind::Map => self.credential.is_some(),
        }
    }

    /// Build the concrete request
    ///
    /// `{key}` in the template is replaced by the credential; otherwise a
    /// configured credential is appended as `credential_param`.
    pub fn build_request(&self) -> Result<ProviderRequest> {
        let url = if self.endpoint_template.contains(KEY_PLACEHOLDER) {
            let credential = self.credential.as_deref().ok_or_else(|| {
                Error::config(format!("Provider {} requires a credential", self.name))
            })?;
            self.endpoint_template.replace(KEY_PLACEHOLDER, credential)
        } else {
            match (&self.credential_param, &self.credential) {
                (Some(param), Some(credential)) => {
                    let separator = if self.endpoint_template.contains('?') {
                        '&'
                    } else {
                        '?'
                    };
                    format!(
                        "{}{}{}={}",
                        self.endpoint_template, separator, param, credential
                    )
                }
                _ => self.endpoint_template.clone(),
            }
        };

        Ok(ProviderRequest {
            provider: self.name.clone(),
            url,
            method: self.method.clone(),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("Provider name cannot be empty"));
        }
        if self.timeout.is_zero() {
            return Err(Error::config(format!(
                "Provider {} timeout must be > 0",
                self.name
            )));
        }
        if self.endpoint_template.trim().is_empty() {
            return Err(Error::config(format!(
                "Provider {} endpoint cannot be empty",
                self.name
            )));
        }
        Ok(())
    }
}

/// A provider selected for a resolution
#[derive(Clone)]
pub struct ActiveProvider {
    pub spec: Arc<ProviderSpec>,
    pub normalizer: Arc<dyn Normalizer>,
}

impl fmt::Debug for ActiveProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveProvider")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Registry of location providers
///
/// Specs keep registration order; normalizers are looked up by provider name.
#[derive(Default)]
pub struct ProviderRegistry {
    specs: Vec<Arc<ProviderSpec>>,
    normalizers: HashMap<String, Arc<dyn Normalizer>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider
    ///
    /// # Errors
    ///
    /// `Error::Config` if the name is taken or the spec is invalid.
    pub fn register(&mut self, spec: ProviderSpec, normalizer: Arc<dyn Normalizer>) -> Result<()> {
        spec.validate()?;
        if self.has_provider(&spec.name) {
            return Err(Error::config(format!(
                "Provider '{}' is already registered",
                spec.name
            )));
        }

        tracing::debug!(
            "Registered provider {} ({:?}, priority {})",
            spec.name,
            spec.kind,
            spec.priority
        );
        self.normalizers.insert(spec.name.clone(), normalizer);
        self.specs.push(Arc::new(spec));
        Ok(())
    }

    /// Check if a provider is registered
    pub fn has_provider(&self, name: &str) -> bool {
        self.normalizers.contains_key(name)
    }

    /// Names of all registered providers, in registration order
    pub fn list_providers(&self) -> Vec<String> {
        self.specs.iter().map(|spec| spec.name.clone()).collect()
    }

    /// Spec of a registered provider
    pub fn spec(&self, name: &str) -> Option<Arc<ProviderSpec>> {
        self.specs.iter().find(|spec| spec.name == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Providers eligible for a resolution, in call order
    ///
    /// Sorted by ascending priority; equal priorities keep registration
    /// order. Map providers without a credential are left out.
    pub fn active_providers(&self) -> Vec<ActiveProvider> {
        let mut active: Vec<ActiveProvider> = self
            .specs
            .iter()
            .filter(|spec| spec.is_usable())
            .filter_map(|spec| {
                self.normalizers.get(&spec.name).map(|normalizer| ActiveProvider {
                    spec: Arc::clone(spec),
                    normalizer: Arc::clone(normalizer),
                })
            })
            .collect();

        // sort_by_key is stable
        active.sort_by_key(|provider| provider.spec.priority);
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use crate::record::LocationRecord;

    struct NullNormalizer;

    impl Normalizer for NullNormalizer {
        fn normalize(&self, provider: &str, _raw: &[u8]) -> Result<LocationRecord> {
            Err(Error::parse(provider, "unused"))
        }
    }

    fn spec(name: &str, kind: ProviderKind, priority: u32) -> ProviderSpec {
        ProviderSpec::new(
            name,
            kind,
            priority,
            format!("https://{}.test/json", name),
            Duration::from_secs(1),
        )
    }

    fn names(registry: &ProviderRegistry) -> Vec<String> {
        registry
            .active_providers()
            .iter()
            .map(|p| p.spec.name.clone())
            .collect()
    }

    #[test]
    fn test_register_and_list() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.is_empty());

        registry
            .register(spec("a", ProviderKind::Ip, 2), Arc::new(NullNormalizer))
            .unwrap();
        registry
            .register(spec("b", ProviderKind::Ip, 1), Arc::new(NullNormalizer))
            .unwrap();

        assert!(registry.has_provider("a"));
        assert!(!registry.has_provider("c"));
        assert_eq!(registry.list_providers(), vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = ProviderRegistry::new();
        registry
            .register(spec("a", ProviderKind::Ip, 1), Arc::new(NullNormalizer))
            .unwrap();

        let err = registry
            .register(spec("a", ProviderKind::Ip, 2), Arc::new(NullNormalizer))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut registry = ProviderRegistry::new();
        let mut bad = spec("a", ProviderKind::Ip, 1);
        bad.timeout = Duration::ZERO;
        assert!(registry.register(bad, Arc::new(NullNormalizer)).is_err());
    }

    #[test]
    fn test_active_order_is_stable() {
        let mut registry = ProviderRegistry::new();
        for (name, priority) in [("m1", 1), ("m2", 2), ("i1", 1), ("i2", 2), ("i3", 3)] {
            let kind = if name.starts_with('m') {
                ProviderKind::Map
            } else {
                ProviderKind::Ip
            };
            let spec = spec(name, kind, priority).with_credential(Some("k".to_string()));
            registry.register(spec, Arc::new(NullNormalizer)).unwrap();
        }

        assert_eq!(names(&registry), vec!["m1", "i1", "m2", "i2", "i3"]);
    }

    #[test]
    fn test_map_without_credential_filtered() {
        let mut registry = ProviderRegistry::new();
        registry
            .register(spec("map", ProviderKind::Map, 1), Arc::new(NullNormalizer))
            .unwrap();
        registry
            .register(
                spec("blank", ProviderKind::Map, 1).with_credential(Some("  ".to_string())),
                Arc::new(NullNormalizer),
            )
            .unwrap();
        registry
            .register(spec("ip", ProviderKind::Ip, 2), Arc::new(NullNormalizer))
            .unwrap();

        assert_eq!(names(&registry), vec!["ip"]);
        // Still registered, just inactive
        assert!(registry.has_provider("map"));
    }

    #[test]
    fn test_build_request_placeholder() {
        let spec = ProviderSpec::new(
            "amap_ip",
            ProviderKind::Map,
            1,
            "https://restapi.amap.com/v3/ip?key={key}&output=json",
            Duration::from_secs(1),
        )
        .with_credential(Some("secret".to_string()));

        let request = spec.build_request().unwrap();
        assert_eq!(
            request.url,
            "https://restapi.amap.com/v3/ip?key=secret&output=json"
        );
        assert_eq!(request.method, HttpMethod::Get);
        assert!(!format!("{:?}", request).contains("secret"));
        assert!(!format!("{:?}", spec).contains("secret"));
    }

    #[test]
    fn test_build_request_placeholder_without_credential() {
        let spec = ProviderSpec::new(
            "amap_ip",
            ProviderKind::Map,
            1,
            "https://restapi.amap.com/v3/ip?key={key}",
            Duration::from_secs(1),
        );
        assert!(matches!(spec.build_request(), Err(Error::Config(_))));
    }

    #[test]
    fn test_build_request_credential_param() {
        let base = ProviderSpec::new(
            "ipinfo_io",
            ProviderKind::Ip,
            3,
            "https://ipinfo.io/json",
            Duration::from_secs(1),
        )
        .with_credential_param("token");

        assert_eq!(base.build_request().unwrap().url, "https://ipinfo.io/json");

        let with_token = base.with_credential(Some("tok".to_string()));
        assert_eq!(
            with_token.build_request().unwrap().url,
            "https://ipinfo.io/json?token=tok"
        );
    }

    #[test]
    fn test_builtin_without_credentials() {
        let registry = ProviderRegistry::with_builtin_providers(&ProviderSettings::default());

        assert_eq!(registry.len(), 7);
        assert_eq!(
            names(&registry),
            vec!["ipapi_co", "ipwho_is", "ipinfo_io", "ip_api_com"]
        );
    }

    #[test]
    fn test_builtin_with_map_credentials() {
        let mut settings = ProviderSettings::default();
        settings.credentials.amap_api_key = Some("amap".to_string());
        settings.credentials.google_maps_api_key = Some("google".to_string());
        settings.api_endpoint = "https://ipapi.example/json/".to_string();

        let registry = ProviderRegistry::with_builtin_providers(&settings);
        assert_eq!(
            names(&registry),
            vec![
                "amap_ip",
                "ipapi_co",
                "google_maps",
                "ipwho_is",
                "ipinfo_io",
                "ip_api_com"
            ]
        );

        let google = registry.spec("google_maps").unwrap();
        assert_eq!(
            google.method,
            HttpMethod::Post(serde_json::json!({"considerIp": true}))
        );
        assert_eq!(
            registry.spec("ipapi_co").unwrap().endpoint_template,
            "https://ipapi.example/json/"
        );
    }
}
