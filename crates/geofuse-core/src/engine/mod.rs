//! Fusion engine
//!
//! The FusionEngine is responsible for:
//! - Answering from the result cache when a fresh record exists
//! - Selecting providers from the registry
//! - Calling them in priority order, or concurrently in multi-source mode
//! - Fusing concurrent answers into one record
//! - Caching the outcome of a successful resolution
//!
//! ## Flow
//!
//! ```text
//! resolve()
//!    │
//!    ▼
//! ┌──────────────┐  hit
//! │ CacheStore   │──────────────────────────────► record
//! └──────────────┘
//!    │ miss
//!    ▼
//! ┌──────────────┐     ┌────────────────┐     ┌─────────────┐
//! │ Registry     │────►│ ProviderClient │────►│ Normalizer  │
//! │ (active set) │     │ (per call)     │     │ (per body)  │
//! └──────────────┘     └────────────────┘     └─────────────┘
//!                                                    │
//!                     priority: first success        │
//!                     multi-source: fuse_results ◄───┘
//!                                   │
//!                                   ▼
//!                           CacheStore::set ──► record
//! ```
//!
//! A failed resolution never touches the cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::client::{ProviderClient, elapsed_millis};
use crate::config::{EngineSettings, ResolutionMode};
use crate::error::{Error, Result};
use crate::metrics::MetricsCollector;
use crate::record::{ConfidenceLevel, FUSION_SOURCE, IndividualResult, LocationRecord, Metadata};
use crate::registry::{ActiveProvider, ProviderRegistry};
use crate::traits::CacheStore;

/// Highest score a fused record can reach
const MAX_FUSED_CONFIDENCE: f64 = 0.95;

/// Resolves the current location from the registered providers
///
/// ## Threading
///
/// All shared state lives behind `Arc`s, so one engine can serve
/// concurrent resolutions.
pub struct FusionEngine {
    registry: Arc<ProviderRegistry>,
    client: ProviderClient,
    cache: Option<Arc<dyn CacheStore>>,
    settings: EngineSettings,
}

impl FusionEngine {
    /// Create a new engine
    ///
    /// Without a cache store every resolution contacts providers.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        client: ProviderClient,
        cache: Option<Arc<dyn CacheStore>>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry,
            client,
            cache,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        self.client.metrics()
    }

    /// Resolve the current location
    ///
    /// # Errors
    ///
    /// `Error::AllProvidersFailed` when no provider produced an acceptable
    /// record. Per-provider failures are logged, counted and absorbed.
    pub async fn resolve(&self) -> Result<LocationRecord> {
        if let Some(record) = self.lookup_cache().await {
            return Ok(record);
        }

        let started = Instant::now();
        let record = match self.settings.mode {
            ResolutionMode::Priority => self.resolve_priority().await?,
            ResolutionMode::MultiSource => self.resolve_multi_source().await?,
        };

        info!(
            "Resolved location via {} in {}ms (confidence {:.2})",
            record.metadata.source_api,
            elapsed_millis(started),
            record.metadata.confidence_score
        );

        if let Some(cache) = &self.cache
            && let Err(e) = cache.set(&self.settings.cache_key, &record).await
        {
            warn!("Failed to cache resolved location: {}", e);
        }

        Ok(record)
    }

    /// Drop every cached record
    pub async fn clear_cache(&self) -> Result<()> {
        match &self.cache {
            Some(cache) => {
                cache.clear().await?;
                info!("Location cache cleared");
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn lookup_cache(&self) -> Option<LocationRecord> {
        let cache = self.cache.as_ref()?;
        let metrics = self.metrics();

        match cache.get(&self.settings.cache_key).await {
            Ok(Some(record)) => {
                metrics.record_cache_hit();
                debug!("Cache hit for {}", self.settings.cache_key);
                Some(record)
            }
            Ok(None) => {
                metrics.record_cache_miss();
                debug!("Cache miss for {}", self.settings.cache_key);
                None
            }
            Err(e) => {
                metrics.record_cache_miss();
                warn!("Cache lookup failed, resolving from providers: {}", e);
                None
            }
        }
    }

    /// Sequential fallback: first provider that yields a record wins
    ///
    /// No call outlives the resolution deadline.
    async fn resolve_priority(&self) -> Result<LocationRecord> {
        let deadline = Instant::now() + self.settings.resolution_timeout;
        let mut failures = Vec::new();

        for provider in self.registry.active_providers() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    "Resolution deadline of {:?} reached; not starting {}",
                    self.settings.resolution_timeout, provider.spec.name
                );
                break;
            }

            match attempt(&self.client, &provider, remaining).await {
                Ok(record) => return Ok(record),
                Err(e) => {
                    warn!("Provider {} failed: {}", provider.spec.name, e);
                    failures.push(e.to_string());
                }
            }
        }

        Err(Error::AllProvidersFailed {
            attempted: failures.len(),
            failures,
        })
    }

    /// Concurrent calls, threshold filtering and fusion
    async fn resolve_multi_source(&self) -> Result<LocationRecord> {
        let selected: Vec<ActiveProvider> = self
            .registry
            .active_providers()
            .into_iter()
            .take(self.settings.max_api_calls)
            .collect();

        let mut outcomes: Vec<Option<Result<LocationRecord>>> =
            selected.iter().map(|_| None).collect();

        let mut join_set = JoinSet::new();
        for (index, provider) in selected.iter().enumerate() {
            let client = self.client.clone();
            let provider = provider.clone();
            join_set.spawn(async move {
                let budget = provider.spec.timeout;
                (index, attempt(&client, &provider, budget).await)
            });
        }

        let total_timeout = self.settings.resolution_timeout;
        let start = Instant::now();

        while !join_set.is_empty() {
            let elapsed = start.elapsed();
            if elapsed >= total_timeout {
                break;
            }

            let remaining = total_timeout - elapsed;
            match timeout(remaining, join_set.join_next()).await {
                Ok(Some(Ok((index, outcome)))) => outcomes[index] = Some(outcome),
                Ok(Some(Err(join_err))) => {
                    warn!("Provider task failed to complete: {}", join_err);
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }

        if !join_set.is_empty() {
            warn!(
                "Resolution deadline of {:?} reached; aborting {} provider call(s)",
                total_timeout,
                join_set.len()
            );
            join_set.abort_all();

            // Tasks that finished before the abort still count
            while let Some(joined) = join_set.join_next().await {
                if let Ok((index, outcome)) = joined {
                    outcomes[index] = Some(outcome);
                }
            }

            let waited_ms = elapsed_millis(start);
            for (index, provider) in selected.iter().enumerate() {
                if outcomes[index].is_none() {
                    self.metrics().record(&provider.spec.name, waited_ms, false);
                    outcomes[index] = Some(Err(Error::timeout(
                        &provider.spec.name,
                        u64::try_from(total_timeout.as_millis()).unwrap_or(u64::MAX),
                    )));
                }
            }
        }

        let threshold = self.settings.min_confidence_threshold;
        let mut qualifying = Vec::new();
        let mut failures = Vec::new();

        // Provider order, not completion order
        for (provider, outcome) in selected.iter().zip(outcomes) {
            let name = &provider.spec.name;
            match outcome {
                Some(Ok(record)) if record.metadata.confidence_score >= threshold => {
                    qualifying.push(record);
                }
                Some(Ok(record)) => {
                    let reason = format!(
                        "{}: confidence {:.2} below threshold {:.2}",
                        name, record.metadata.confidence_score, threshold
                    );
                    debug!("Dropping record from {}", reason);
                    failures.push(reason);
                }
                Some(Err(e)) => {
                    warn!("Provider {} failed: {}", name, e);
                    failures.push(e.to_string());
                }
                None => failures.push(format!("{}: task did not complete", name)),
            }
        }

        debug!(
            "{} of {} provider(s) qualified for fusion",
            qualifying.len(),
            selected.len()
        );

        fuse_results(qualifying).ok_or_else(|| Error::AllProvidersFailed {
            attempted: selected.len(),
            failures,
        })
    }
}

/// Call one provider within `budget` and normalize its answer
///
/// An answer that cannot be normalized counts as a failed call.
async fn attempt(
    client: &ProviderClient,
    provider: &ActiveProvider,
    budget: Duration,
) -> Result<LocationRecord> {
    let raw = client.call_within(&provider.spec, budget).await?;
    provider
        .normalizer
        .normalize(&provider.spec.name, &raw.body)
        .inspect_err(|_| client.metrics().record_parse_failure(&provider.spec.name))
}

/// Merge qualifying records, given in provider order
///
/// A single record is returned unchanged; `None` for no records.
///
/// Coordinates are the mean over the records carrying a pair. The remaining
/// fields come from the most complete record, the earliest one on ties.
pub fn fuse_results(mut records: Vec<LocationRecord>) -> Option<LocationRecord> {
    match records.len() {
        0 => return None,
        1 => return records.pop(),
        _ => {}
    }

    let count = records.len();
    let voters: Vec<(f64, f64)> = records.iter().filter_map(LocationRecord::coordinates).collect();
    let centre = if voters.is_empty() {
        None
    } else {
        let n = voters.len() as f64;
        let lat = voters.iter().map(|(lat, _)| lat).sum::<f64>() / n;
        let lon = voters.iter().map(|(_, lon)| lon).sum::<f64>() / n;
        Some((lat, lon))
    };

    let mut base = &records[0];
    for record in &records[1..] {
        if record.populated_field_count() > base.populated_field_count() {
            base = record;
        }
    }

    let sources: Vec<&str> = records.iter().map(|r| r.source.as_str()).collect();
    let score = ((6 + count) as f64 / 10.0).min(MAX_FUSED_CONFIDENCE);

    let mut fused = base.clone();
    fused.latitude = centre.map(|(lat, _)| lat);
    fused.longitude = centre.map(|(_, lon)| lon);
    fused.source = FUSION_SOURCE.to_string();
    fused.metadata = Metadata {
        source_api: format!("Multi-source ({} APIs)", count),
        timestamp: Utc::now(),
        confidence: ConfidenceLevel::High,
        confidence_score: score,
        accuracy_notes: vec![
            format!("Fused from {} sources", count),
            format!("Sources: {}", sources.join(", ")),
            format!("Fusion confidence: {:.0}%", score * 100.0),
        ],
        individual_results: Some(
            records
                .iter()
                .map(|r| IndividualResult {
                    source: r.source.clone(),
                    confidence: r.metadata.confidence_score,
                    confidence_level: r.metadata.confidence,
                })
                .collect(),
        ),
    };

    Some(fused)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LocationType;

    fn record(source: &str, coords: Option<(f64, f64)>, score: f64) -> LocationRecord {
        let mut record = LocationRecord::new(
            source,
            LocationType::Ip,
            Metadata {
                source_api: source.to_string(),
                timestamp: Utc::now(),
                confidence: ConfidenceLevel::Medium,
                confidence_score: score,
                accuracy_notes: Vec::new(),
                individual_results: None,
            },
        );
        if let Some((lat, lon)) = coords {
            record.latitude = Some(lat);
            record.longitude = Some(lon);
        }
        record
    }

    #[test]
    fn test_fuse_empty() {
        assert_eq!(fuse_results(Vec::new()), None);
    }

    #[test]
    fn test_fuse_single_unchanged() {
        let only = record("ipapi_co", Some((1.0, 2.0)), 0.7);
        assert_eq!(fuse_results(vec![only.clone()]), Some(only));
    }

    #[test]
    fn test_fuse_three_records() {
        let records = vec![
            record("a", Some((10.0, 1.0)), 0.7),
            record("b", Some((20.0, 2.0)), 0.8),
            record("c", Some((30.0, 3.0)), 0.9),
        ];

        let fused = fuse_results(records).unwrap();
        assert_eq!(fused.coordinates(), Some((20.0, 2.0)));
        assert_eq!(fused.source, FUSION_SOURCE);
        assert_eq!(fused.metadata.confidence, ConfidenceLevel::High);
        assert_eq!(fused.metadata.confidence_score, 0.9);
        assert_eq!(fused.metadata.source_api, "Multi-source (3 APIs)");

        let individual = fused.metadata.individual_results.unwrap();
        assert_eq!(individual.len(), 3);
        assert_eq!(individual[1].source, "b");
        assert_eq!(individual[1].confidence, 0.8);
        assert_eq!(individual[1].confidence_level, ConfidenceLevel::Medium);
    }

    #[test]
    fn test_fused_score_capped() {
        let records: Vec<_> = (0..5)
            .map(|i| record(&format!("p{}", i), Some((0.0, 0.0)), 0.7))
            .collect();
        let fused = fuse_results(records).unwrap();
        assert_eq!(fused.metadata.confidence_score, MAX_FUSED_CONFIDENCE);
    }

    #[test]
    fn test_coordinate_less_record_does_not_vote_but_can_be_base() {
        let mut rich = record("amap_ip", None, 0.9);
        rich.city = Some("Beijing".to_string());
        rich.region = Some("Beijing".to_string());
        rich.country = Some("China".to_string());

        let records = vec![
            record("ipapi_co", Some((10.0, 100.0)), 0.8),
            rich,
            record("ipwho_is", Some((20.0, 120.0)), 0.8),
        ];

        let fused = fuse_results(records).unwrap();
        assert_eq!(fused.coordinates(), Some((15.0, 110.0)));
        assert_eq!(fused.city.as_deref(), Some("Beijing"));
        assert!(fused.has_valid_coordinates());
    }

    #[test]
    fn test_no_voters_means_no_coordinates() {
        let fused = fuse_results(vec![record("a", None, 0.9), record("b", None, 0.9)]).unwrap();
        assert_eq!(fused.latitude, None);
        assert_eq!(fused.longitude, None);
    }

    #[test]
    fn test_first_most_complete_wins_ties() {
        let mut first = record("first", Some((1.0, 1.0)), 0.8);
        first.city = Some("One".to_string());
        let mut second = record("second", Some((3.0, 3.0)), 0.8);
        second.city = Some("Two".to_string());

        let fused = fuse_results(vec![first, second]).unwrap();
        assert_eq!(fused.city.as_deref(), Some("One"));
        assert_eq!(fused.coordinates(), Some((2.0, 2.0)));
    }
}
