//! Provider call and cache statistics
//!
//! One collector is shared by every provider task of a resolution. Averages
//! and rates are derived at snapshot time from running sums.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct CallStats {
    requests: u64,
    successes: u64,
    failures: u64,
    parse_failures: u64,
    total_ms: u64,
}

impl CallStats {
    fn record(&mut self, elapsed_ms: u64, success: bool) {
        self.requests += 1;
        self.total_ms = self.total_ms.saturating_add(elapsed_ms);
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
    }

    fn demote(&mut self) {
        if self.successes > 0 {
            self.successes -= 1;
            self.failures += 1;
        }
    }

    fn average_ms(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.requests as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    overall: CallStats,
    providers: BTreeMap<String, CallStats>,
    cache_hits: u64,
    cache_misses: u64,
}

/// Thread-safe metrics collector
#[derive(Debug, Default)]
pub struct MetricsCollector {
    counters: Mutex<Counters>,
}

/// Per-provider statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStats {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub parse_failures: u64,
    pub average_response_time: f64,
}

/// Point-in-time copy of the collected metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time: f64,
    pub api_stats: BTreeMap<String, ProviderStats>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub success_rate: String,
    pub cache_hit_rate: String,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed provider call
    pub fn record(&self, provider: &str, elapsed_ms: u64, success: bool) {
        let mut counters = self.lock();
        counters.overall.record(elapsed_ms, success);
        counters
            .providers
            .entry(provider.to_string())
            .or_default()
            .record(elapsed_ms, success);
    }

    /// Record a response that arrived but could not be normalized
    ///
    /// The call was recorded as a success when it returned; it is moved to
    /// the failures and also counted under `parse_failures`.
    pub fn record_parse_failure(&self, provider: &str) {
        let mut counters = self.lock();
        counters.overall.demote();
        let stats = counters.providers.entry(provider.to_string()).or_default();
        stats.demote();
        stats.parse_failures += 1;
    }

    pub fn record_cache_hit(&self) {
        self.lock().cache_hits += 1;
    }

    pub fn record_cache_miss(&self) {
        self.lock().cache_misses += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.lock();

        let api_stats = counters
            .providers
            .iter()
            .map(|(name, stats)| {
                (
                    name.clone(),
                    ProviderStats {
                        requests: stats.requests,
                        successes: stats.successes,
                        failures: stats.failures,
                        parse_failures: stats.parse_failures,
                        average_response_time: stats.average_ms(),
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            total_requests: counters.overall.requests,
            successful_requests: counters.overall.successes,
            failed_requests: counters.overall.failures,
            average_response_time: counters.overall.average_ms(),
            api_stats,
            cache_hits: counters.cache_hits,
            cache_misses: counters.cache_misses,
            success_rate: format_rate(counters.overall.successes, counters.overall.requests),
            cache_hit_rate: format_rate(
                counters.cache_hits,
                counters.cache_hits + counters.cache_misses,
            ),
        }
    }

    // Counters stay consistent even if a recording thread panicked
    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// `part / total` as a percentage with two decimals, `"0%"` for an empty total
pub fn format_rate(part: u64, total: u64) -> String {
    if total == 0 {
        return "0%".to_string();
    }
    format!("{:.2}%", part as f64 / total as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_empty_snapshot() {
        let snapshot = MetricsCollector::new().snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.average_response_time, 0.0);
        assert_eq!(snapshot.success_rate, "0%");
        assert_eq!(snapshot.cache_hit_rate, "0%");
        assert!(snapshot.api_stats.is_empty());
    }

    #[test]
    fn test_success_rate_formatting() {
        let metrics = MetricsCollector::new();
        metrics.record("ipapi_co", 100, true);
        metrics.record("ipapi_co", 200, true);
        metrics.record("ipwho_is", 300, false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.successful_requests, 2);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.success_rate, "66.67%");
        assert_eq!(snapshot.average_response_time, 200.0);

        let ipapi = &snapshot.api_stats["ipapi_co"];
        assert_eq!(ipapi.requests, 2);
        assert_eq!(ipapi.average_response_time, 150.0);
        assert_eq!(snapshot.api_stats["ipwho_is"].failures, 1);
    }

    #[test]
    fn test_cache_hit_rate() {
        let metrics = MetricsCollector::new();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_cache_miss();
        metrics.record_cache_miss();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 3);
        assert_eq!(snapshot.cache_hit_rate, "25.00%");
    }

    #[test]
    fn test_parse_failure_counts_as_failed_call() {
        let metrics = MetricsCollector::new();
        metrics.record("amap_ip", 50, true);
        metrics.record_parse_failure("amap_ip");
        metrics.record("ipwho_is", 70, true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.successful_requests, 1);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.success_rate, "50.00%");
        assert_eq!(snapshot.average_response_time, 60.0);

        let amap = &snapshot.api_stats["amap_ip"];
        assert_eq!(amap.requests, 1);
        assert_eq!(amap.successes, 0);
        assert_eq!(amap.failures, 1);
        assert_eq!(amap.parse_failures, 1);
    }

    #[test]
    fn test_parse_failure_without_recorded_call() {
        let metrics = MetricsCollector::new();
        metrics.record_parse_failure("amap_ip");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.failed_requests, 0);
        assert_eq!(snapshot.api_stats["amap_ip"].parse_failures, 1);
    }

    #[test]
    fn test_wire_names() {
        let metrics = MetricsCollector::new();
        metrics.record("ipapi_co", 10, true);

        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["totalRequests"], 1);
        assert_eq!(json["successRate"], "100.00%");
        assert_eq!(json["apiStats"]["ipapi_co"]["parseFailures"], 0);
        assert!(json.get("cacheHitRate").is_some());
    }

    #[test]
    fn test_concurrent_recording() {
        let metrics = Arc::new(MetricsCollector::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.record(&format!("provider_{}", i % 2), 1, true);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 800);
        assert_eq!(snapshot.api_stats["provider_0"].requests, 400);
    }
}
