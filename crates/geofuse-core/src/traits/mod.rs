//! Core traits for geofuse
//!
//! - [`HttpTransport`]: Execute one provider request
//! - [`Normalizer`]: Map one provider's JSON to a [`LocationRecord`](crate::LocationRecord)
//! - [`CacheStore`]: TTL store of resolved records

pub mod cache_store;
pub mod normalizer;
pub mod transport;

pub use cache_store::{CacheEntry, CacheStore};
pub use normalizer::Normalizer;
pub use transport::{HttpMethod, HttpTransport, ProviderRequest, TransportResponse};
