use super::model::{Stump, StumpEnsemble, softmax};

/// Hyperparameters for stump boosting.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    /// Number of boosting rounds.
    pub rounds: usize,
    /// Shrinkage applied per round.
    pub shrinkage: f32,
    /// Number of histogram bins for split search.
    pub bins: usize,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            rounds: 80,
            shrinkage: 0.1,
            bins: 32,
        }
    }
}

/// In-memory weighted training set.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    /// Feature vector length.
    pub feature_len: usize,
    /// Category labels in class-index order.
    pub classes: Vec<String>,
    /// Feature matrix, row-major.
    pub x: Vec<Vec<f32>>,
    /// Class indices aligned with `x`.
    pub y: Vec<usize>,
    /// Per-sample weights aligned with `x`; larger weight pulls the fit
    /// harder toward that sample.
    pub weights: Vec<f32>,
}

/// Train a weighted multi-class stump ensemble via softmax gradient boosting.
///
/// Every aggregate in the fit (class priors, split scores, leaf values) is
/// weighted by the per-sample weights, so heavily weighted samples dominate
/// both where splits land and what the leaves predict.
pub fn train_stump_ensemble(
    dataset: &TrainingSet,
    options: &TrainOptions,
) -> Result<StumpEnsemble, String> {
    let n = dataset.x.len();
    if n == 0 {
        return Err("Empty training set".to_string());
    }
    if dataset.y.len() != n || dataset.weights.len() != n {
        return Err("Mismatched X/Y/weight lengths".to_string());
    }
    let n_classes = dataset.classes.len();
    if n_classes < 2 {
        return Err("Need at least 2 classes".to_string());
    }
    if dataset.weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err("Sample weights must be finite and non-negative".to_string());
    }

    let weights = effective_weights(&dataset.weights);
    let d = dataset.feature_len;
    let (mins, maxs) = feature_ranges(&dataset.x, d);
    let binned = bin_features(&dataset.x, &mins, &maxs, options.bins);

    let base_scores: Vec<f32> = weighted_priors(&dataset.y, &weights, n_classes)
        .iter()
        .map(|&p| p.max(1e-6).ln())
        .collect();
    let mut scores = vec![base_scores.clone(); n];

    let mut rounds_out: Vec<Vec<Stump>> = Vec::with_capacity(options.rounds);
    for _ in 0..options.rounds {
        let probs: Vec<Vec<f32>> = scores.iter().map(|row| softmax(row)).collect();

        let mut round = Vec::with_capacity(n_classes);
        for class_idx in 0..n_classes {
            let residuals: Vec<f32> = (0..n)
                .map(|i| {
                    let target = if dataset.y[i] == class_idx { 1.0 } else { 0.0 };
                    target - probs[i][class_idx]
                })
                .collect();
            let stump = fit_weighted_stump(
                &binned,
                &dataset.x,
                &mins,
                &maxs,
                options.bins,
                &residuals,
                &weights,
            );
            for i in 0..n {
                scores[i][class_idx] += options.shrinkage * stump.predict(&dataset.x[i]);
            }
            round.push(stump);
        }
        rounds_out.push(round);
    }

    Ok(StumpEnsemble {
        feature_len: dataset.feature_len,
        classes: dataset.classes.clone(),
        shrinkage: options.shrinkage,
        base_scores,
        rounds: rounds_out,
    })
}

/// Fall back to uniform weights when the provided ones carry no mass.
fn effective_weights(weights: &[f32]) -> Vec<f32> {
    let total: f32 = weights.iter().sum();
    if total > 0.0 {
        weights.to_vec()
    } else {
        vec![1.0; weights.len()]
    }
}

fn weighted_priors(y: &[usize], weights: &[f32], n_classes: usize) -> Vec<f32> {
    let mut mass = vec![0.0f32; n_classes];
    let mut total = 0.0f32;
    for (&label, &weight) in y.iter().zip(weights) {
        if label < n_classes {
            mass[label] += weight;
            total += weight;
        }
    }
    if total <= 0.0 {
        return vec![1.0 / n_classes as f32; n_classes];
    }
    mass.into_iter().map(|m| m / total).collect()
}

fn feature_ranges(x: &[Vec<f32>], feature_len: usize) -> (Vec<f32>, Vec<f32>) {
    let mut mins = vec![f32::INFINITY; feature_len];
    let mut maxs = vec![f32::NEG_INFINITY; feature_len];
    for row in x {
        for (j, &v) in row.iter().take(feature_len).enumerate() {
            if v.is_finite() {
                mins[j] = mins[j].min(v);
                maxs[j] = maxs[j].max(v);
            }
        }
    }
    for j in 0..feature_len {
        if !mins[j].is_finite() || !maxs[j].is_finite() {
            mins[j] = 0.0;
            maxs[j] = 0.0;
        }
        if mins[j] == maxs[j] {
            maxs[j] = mins[j] + 1.0;
        }
    }
    (mins, maxs)
}

fn bin_features(x: &[Vec<f32>], mins: &[f32], maxs: &[f32], bins: usize) -> Vec<Vec<u8>> {
    let bins = bins.clamp(2, 256) as f32;
    x.iter()
        .map(|row| {
            mins.iter()
                .enumerate()
                .map(|(j, &min)| {
                    let max = maxs[j];
                    let v = row.get(j).copied().unwrap_or(0.0);
                    let t = if max > min {
                        ((v - min) / (max - min)).clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    (t * (bins - 1.0)).round() as u8
                })
                .collect()
        })
        .collect()
}

fn fit_weighted_stump(
    binned: &[Vec<u8>],
    x: &[Vec<f32>],
    mins: &[f32],
    maxs: &[f32],
    bins: usize,
    residuals: &[f32],
    weights: &[f32],
) -> Stump {
    let bins = bins.clamp(2, 256);

    let mut best = WeightedSplit::default();
    for feature_idx in 0..mins.len() {
        let split = best_split_for_feature(binned, residuals, weights, feature_idx, bins);
        if split.score < best.score {
            best = split;
        }
    }

    let feature_idx = best.feature_index;
    let threshold = threshold_for_bin(mins[feature_idx], maxs[feature_idx], best.split_bin, bins);
    let (left_value, right_value) =
        weighted_leaf_values(x, residuals, weights, feature_idx, threshold);
    Stump {
        feature_index: feature_idx as u16,
        threshold,
        left_value,
        right_value,
    }
}

#[derive(Debug, Clone)]
struct WeightedSplit {
    score: f64,
    feature_index: usize,
    split_bin: usize,
}

impl Default for WeightedSplit {
    fn default() -> Self {
        Self {
            score: f64::INFINITY,
            feature_index: 0,
            split_bin: 0,
        }
    }
}

/// Weighted SSE split search over a binned feature.
fn best_split_for_feature(
    binned: &[Vec<u8>],
    residuals: &[f32],
    weights: &[f32],
    feature_idx: usize,
    bins: usize,
) -> WeightedSplit {
    let mut mass = vec![0f64; bins];
    let mut sums = vec![0f64; bins];
    let mut sums_sq = vec![0f64; bins];
    for (i, row) in binned.iter().enumerate() {
        let b = row.get(feature_idx).copied().unwrap_or(0) as usize;
        let w = weights[i] as f64;
        let r = residuals[i] as f64;
        mass[b] += w;
        sums[b] += w * r;
        sums_sq[b] += w * r * r;
    }
    let total_mass: f64 = mass.iter().sum();
    if total_mass <= 0.0 {
        return WeightedSplit::default();
    }
    let total_sum: f64 = sums.iter().sum();
    let total_sum_sq: f64 = sums_sq.iter().sum();

    let mut best_score = f64::INFINITY;
    let mut best_bin = 0usize;

    let mut left_mass = 0f64;
    let mut left_sum = 0f64;
    let mut left_sum_sq = 0f64;

    for split_bin in 0..(bins - 1) {
        left_mass += mass[split_bin];
        left_sum += sums[split_bin];
        left_sum_sq += sums_sq[split_bin];
        let right_mass = total_mass - left_mass;
        if left_mass <= 0.0 || right_mass <= 0.0 {
            continue;
        }
        let right_sum = total_sum - left_sum;
        let right_sum_sq = total_sum_sq - left_sum_sq;
        let left_sse = left_sum_sq - (left_sum * left_sum) / left_mass;
        let right_sse = right_sum_sq - (right_sum * right_sum) / right_mass;
        let score = left_sse + right_sse;
        if score < best_score {
            best_score = score;
            best_bin = split_bin;
        }
    }

    WeightedSplit {
        score: best_score,
        feature_index: feature_idx,
        split_bin: best_bin,
    }
}

fn threshold_for_bin(min: f32, max: f32, split_bin: usize, bins: usize) -> f32 {
    let t = ((split_bin + 1) as f32) / bins as f32;
    min + t * (max - min)
}

fn weighted_leaf_values(
    x: &[Vec<f32>],
    residuals: &[f32],
    weights: &[f32],
    feature_idx: usize,
    threshold: f32,
) -> (f32, f32) {
    let mut left_sum = 0.0f32;
    let mut left_mass = 0.0f32;
    let mut right_sum = 0.0f32;
    let mut right_mass = 0.0f32;
    for (i, row) in x.iter().enumerate() {
        let v = row.get(feature_idx).copied().unwrap_or(0.0);
        if v <= threshold {
            left_sum += weights[i] * residuals[i];
            left_mass += weights[i];
        } else {
            right_sum += weights[i] * residuals[i];
            right_mass += weights[i];
        }
    }
    let left_value = if left_mass > 0.0 { left_sum / left_mass } else { 0.0 };
    let right_value = if right_mass > 0.0 { right_sum / right_mass } else { 0.0 };
    (left_value, right_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable_set() -> TrainingSet {
        // Feature 0 separates the classes cleanly.
        let x: Vec<Vec<f32>> = (0..12)
            .map(|i| {
                if i % 2 == 0 {
                    vec![0.1, 0.5]
                } else {
                    vec![0.9, 0.5]
                }
            })
            .collect();
        let y: Vec<usize> = (0..12).map(|i| i % 2).collect();
        let weights = vec![1.0; 12];
        TrainingSet {
            feature_len: 2,
            classes: vec!["Groceries".into(), "Healthcare".into()],
            x,
            y,
            weights,
        }
    }

    #[test]
    fn learns_a_separable_problem() {
        let ensemble = train_stump_ensemble(&separable_set(), &TrainOptions::default()).unwrap();
        ensemble.validate().unwrap();
        let (idx, prob) = ensemble.predict(&[0.1, 0.5]);
        assert_eq!(idx, 0);
        assert!(prob > 0.6);
        let (idx, _) = ensemble.predict(&[0.9, 0.5]);
        assert_eq!(idx, 1);
    }

    #[test]
    fn heavier_samples_win_conflicts() {
        // Identical feature vectors with conflicting labels; the heavily
        // weighted label must dominate the prediction.
        let x = vec![vec![0.5f32]; 10];
        let y: Vec<usize> = (0..10).map(|i| usize::from(i == 0)).collect();
        let mut weights = vec![0.01f32; 10];
        weights[0] = 10.0;
        let dataset = TrainingSet {
            feature_len: 1,
            classes: vec!["A".into(), "B".into()],
            x,
            y,
            weights,
        };
        let ensemble = train_stump_ensemble(&dataset, &TrainOptions::default()).unwrap();
        let (idx, _) = ensemble.predict(&[0.5]);
        assert_eq!(idx, 1);
    }

    #[test]
    fn zero_weight_mass_falls_back_to_uniform() {
        let mut dataset = separable_set();
        dataset.weights = vec![0.0; dataset.x.len()];
        let ensemble = train_stump_ensemble(&dataset, &TrainOptions::default()).unwrap();
        let (idx, _) = ensemble.predict(&[0.1, 0.5]);
        assert_eq!(idx, 0);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let mut dataset = separable_set();
        dataset.weights.pop();
        assert!(train_stump_ensemble(&dataset, &TrainOptions::default()).is_err());
    }

    #[test]
    fn rejects_single_class() {
        let dataset = TrainingSet {
            feature_len: 1,
            classes: vec!["Only".into()],
            x: vec![vec![0.0]],
            y: vec![0],
            weights: vec![1.0],
        };
        assert!(train_stump_ensemble(&dataset, &TrainOptions::default()).is_err());
    }
}
