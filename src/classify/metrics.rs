//! Run-level metrics exposed to the run-logging sink.

use std::collections::BTreeMap;

use super::ClassificationResult;

/// Fraction of results assigned a real category (not Unknown).
pub fn coverage(results: &[ClassificationResult]) -> f32 {
    if results.is_empty() {
        return 0.0;
    }
    let known = results.iter().filter(|r| !r.is_unknown()).count();
    known as f32 / results.len() as f32
}

/// Result counts per category.
pub fn category_distribution(results: &[ClassificationResult]) -> BTreeMap<String, usize> {
    let mut distribution = BTreeMap::new();
    for result in results {
        *distribution.entry(result.category.clone()).or_insert(0) += 1;
    }
    distribution
}

/// Number of results flagged for human review.
pub fn review_count(results: &[ClassificationResult]) -> usize {
    results.iter().filter(|r| r.needs_review).count()
}
