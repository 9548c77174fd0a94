// # geofuse-core
//
// Core library of the multi-provider geolocation resolver.
//
// ## Architecture Overview
//
// - **ProviderRegistry**: Known providers with their normalizers and priorities
// - **ProviderClient**: One bounded HTTP call per provider, metered
// - **Normalizer**: Maps each provider's response to a `LocationRecord`
// - **FusionEngine**: Priority fallback or concurrent multi-source fusion
// - **CacheStore**: TTL cache of the last resolved record
// - **MetricsCollector**: Call, failure and cache statistics
//
// ## Design Principles
//
// 1. **Transport Seam**: HTTP lives behind `HttpTransport`; this crate does no I/O
//    besides the cache file
// 2. **Plugin-Based**: Providers are registered, never matched by name
// 3. **Library-First**: The binary only composes these parts
// 4. **Failure Isolation**: A failing provider abstains; only total failure
//    surfaces to the caller

pub mod cache;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod record;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use cache::{FileCacheStore, MemoryCacheStore};
pub use client::{ProviderClient, RawResponse};
pub use config::{CacheConfig, Credentials, EngineSettings, LocatorConfig, ResolutionMode};
pub use engine::{FusionEngine, fuse_results};
pub use error::{Error, Result, suggestion_for};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use record::{ConfidenceLevel, LocationRecord, LocationType, Metadata};
pub use registry::{ActiveProvider, ProviderKind, ProviderRegistry, ProviderSpec};
pub use traits::{CacheStore, HttpTransport, Normalizer};
