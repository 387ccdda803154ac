//! Unsupervised discovery of candidate categories from unmatched narrations.
//!
//! Clusters sit in a TF-IDF space fitted locally to the input texts; the
//! fitted state of the fallback classifier is never reused here. Output is
//! advisory: integrating a discovered category into the rule set is an
//! external decision.

use std::collections::BTreeMap;

use hdbscan::{Hdbscan, HdbscanHyperParams};
use serde::Serialize;

use crate::ml::vectorizer::TfidfVectorizer;

/// Fewer input texts than this yield an empty result, not an error.
pub const MIN_DISCOVERY_TEXTS: usize = 5;

/// Smallest group of narrations considered a cluster.
const MIN_CLUSTER_SIZE: usize = 2;

/// Vocabulary cap for the discovery-local vectorizer.
const DISCOVERY_MAX_FEATURES: usize = 200;

/// Upper bound on representative texts kept per cluster.
const SAMPLE_TEXT_CAP: usize = 10;

/// Number of induced keywords reported per cluster.
const INDUCED_KEYWORD_CAP: usize = 5;

/// One candidate category surfaced by a discovery run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredCategory {
    /// Synthetic identifier, stable within one run.
    pub name: String,
    /// Representative member narrations in input order, bounded in size.
    pub sample_texts: Vec<String>,
    /// Total member count.
    pub size: usize,
    /// Top recurring n-grams across the cluster.
    pub induced_keywords: Vec<String>,
}

/// Cluster unmatched narrations into candidate categories.
///
/// TF-IDF vectors are L2-normalized, so the Euclidean geometry HDBSCAN works
/// in is monotone in cosine distance. Noise points are discarded.
pub fn discover_new_categories(
    texts: &[String],
) -> Result<BTreeMap<String, DiscoveredCategory>, String> {
    if texts.len() < MIN_DISCOVERY_TEXTS {
        return Ok(BTreeMap::new());
    }

    let vectorizer = TfidfVectorizer::fit(texts, DISCOVERY_MAX_FEATURES);
    if vectorizer.feature_len() == 0 {
        return Ok(BTreeMap::new());
    }
    let data = vectorizer.transform_batch(texts);

    let hyper_params = HdbscanHyperParams::builder()
        .min_cluster_size(MIN_CLUSTER_SIZE)
        .build();
    let clusterer = Hdbscan::new(&data, hyper_params);
    let labels = clusterer
        .cluster()
        .map_err(|err| format!("Discovery clustering failed: {err}"))?;
    if labels.len() != texts.len() {
        return Err("Clustering output length mismatch".to_string());
    }

    let mut members: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (idx, &label) in labels.iter().enumerate() {
        if label < 0 {
            continue; // noise
        }
        members.entry(label).or_default().push(idx);
    }

    let feature_names = vectorizer.feature_names();
    let mut discovered = BTreeMap::new();
    for (label, indices) in members {
        let name = format!("NewCategory_{label}");
        let sample_texts: Vec<String> = indices
            .iter()
            .take(SAMPLE_TEXT_CAP)
            .map(|&idx| texts[idx].clone())
            .collect();
        let induced_keywords = induced_keywords(&data, &indices, &feature_names);
        discovered.insert(
            name.clone(),
            DiscoveredCategory {
                name,
                sample_texts,
                size: indices.len(),
                induced_keywords,
            },
        );
    }
    Ok(discovered)
}

/// Top-weighted n-grams across a cluster's vectorized members.
fn induced_keywords(
    data: &[Vec<f32>],
    member_indices: &[usize],
    feature_names: &[String],
) -> Vec<String> {
    let mut totals = vec![0.0f32; feature_names.len()];
    for &idx in member_indices {
        for (j, &value) in data[idx].iter().enumerate() {
            totals[j] += value;
        }
    }
    let mut ranked: Vec<(usize, f32)> = totals
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, total)| *total > 0.0)
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked
        .into_iter()
        .take(INDUCED_KEYWORD_CAP)
        .map(|(idx, _)| feature_names[idx].clone())
        .collect()
}
