//! Completeness-adjusted confidence

use crate::record::LocationRecord;

/// Bonus per populated field group
const COMPLETENESS_BONUS: f64 = 0.1;

/// Upper bound of any per-provider score
const MAX_CONFIDENCE: f64 = 1.0;

/// Adjust a provider baseline by how complete the record is
///
/// Adds 0.1 for each of city, region, country and a coordinate pair, then
/// caps at 1.0. Never decreases when a field is added.
pub fn calculate_confidence(record: &LocationRecord, baseline: f64) -> f64 {
    let groups = [
        record.city.is_some(),
        record.region.is_some(),
        record.country.is_some(),
        record.coordinates().is_some(),
    ];
    let bonus = groups.iter().filter(|present| **present).count() as f64 * COMPLETENESS_BONUS;
    (baseline + bonus).clamp(0.0, MAX_CONFIDENCE)
}
