use serde::{Deserialize, Serialize};

/// Single-split decision tree used as a weak learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stump {
    /// Feature index the split reads.
    pub feature_index: u16,
    /// Split threshold in feature units.
    pub threshold: f32,
    /// Contribution when `feature <= threshold`.
    pub left_value: f32,
    /// Contribution when `feature > threshold`.
    pub right_value: f32,
}

impl Stump {
    pub fn predict(&self, features: &[f32]) -> f32 {
        let value = features
            .get(self.feature_index as usize)
            .copied()
            .unwrap_or(0.0);
        if value <= self.threshold {
            self.left_value
        } else {
            self.right_value
        }
    }
}

/// Multi-class ensemble of boosted stumps.
///
/// Class scores start from `base_scores` (log priors) and accumulate
/// shrinkage-scaled stump contributions round by round. Probabilities come
/// from a softmax over the final scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StumpEnsemble {
    /// Expected feature vector length.
    pub feature_len: usize,
    /// Category labels in class-index order.
    pub classes: Vec<String>,
    /// Shrinkage applied to each stump contribution.
    pub shrinkage: f32,
    /// Initial per-class scores before boosting rounds.
    pub base_scores: Vec<f32>,
    /// Shape: `[n_rounds][n_classes]`.
    pub rounds: Vec<Vec<Stump>>,
}

impl StumpEnsemble {
    /// Check structural invariants of a deserialized ensemble.
    pub fn validate(&self) -> Result<(), String> {
        if self.classes.len() < 2 {
            return Err("Ensemble must contain at least 2 classes".to_string());
        }
        if self.base_scores.len() != self.classes.len() {
            return Err("base_scores length must match classes length".to_string());
        }
        for (round_idx, round) in self.rounds.iter().enumerate() {
            if round.len() != self.classes.len() {
                return Err(format!(
                    "Round {round_idx} has {} stumps but expected {}",
                    round.len(),
                    self.classes.len()
                ));
            }
        }
        Ok(())
    }

    /// Raw per-class scores for a feature vector.
    pub fn predict_scores(&self, features: &[f32]) -> Vec<f32> {
        let mut scores = self.base_scores.clone();
        for round in &self.rounds {
            for (class_idx, stump) in round.iter().enumerate() {
                scores[class_idx] += self.shrinkage * stump.predict(features);
            }
        }
        scores
    }

    /// Class probabilities for a feature vector.
    pub fn predict_proba(&self, features: &[f32]) -> Vec<f32> {
        softmax(&self.predict_scores(features))
    }

    /// Best class index and its probability for a feature vector.
    pub fn predict(&self, features: &[f32]) -> (usize, f32) {
        let probs = self.predict_proba(features);
        let mut best_idx = 0usize;
        let mut best_prob = f32::NEG_INFINITY;
        for (idx, &prob) in probs.iter().enumerate() {
            if prob > best_prob {
                best_prob = prob;
                best_idx = idx;
            }
        }
        (best_idx, best_prob.max(0.0))
    }
}

/// Numerically-stable softmax.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 {
        return vec![1.0 / scores.len() as f32; scores.len()];
    }
    exps.into_iter().map(|v| v / sum).collect()
}
