//! Adaptive classification engine.
//!
//! Combines rule-based keyword matching with a learned fallback model: every
//! record gets a rule-based pass first, and rows whose confidence falls below
//! the unknown threshold are re-predicted by the fallback when one has been
//! trained. One engine instance owns its rules and optional model; training
//! replaces the model atomically and must be serialized by the caller.

pub mod matcher;
pub mod metrics;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::discovery::{self, DiscoveredCategory};
use crate::ml::gbdt_stump::{StumpEnsemble, TrainOptions, TrainingSet, train_stump_ensemble};
use crate::ml::vectorizer::{DEFAULT_MAX_FEATURES, TfidfVectorizer};
use crate::records::TransactionRecord;
use crate::rules::{CompiledRules, RuleSet, RulesError, UNKNOWN_CATEGORY};

/// Minimum labeled sample count required to train the fallback model.
pub const MIN_TRAIN_SAMPLES: usize = 10;

/// How a classification result was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "rule-based")]
    RuleBased,
    #[serde(rename = "ml-based")]
    MlBased,
}

/// Classification output for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub narration: String,
    pub amount: Option<f64>,
    pub category: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Keywords that produced the rule-based score.
    pub matched_keywords: BTreeSet<String>,
    pub method: Method,
    pub needs_review: bool,
}

impl ClassificationResult {
    pub fn is_unknown(&self) -> bool {
        self.category == UNKNOWN_CATEGORY
    }
}

/// Counters for the most recent `classify_batch` call.
///
/// Replaced wholesale at the start of each batch run; they never accumulate
/// across runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierRunStats {
    pub total_classified: usize,
    pub rule_based_count: usize,
    pub ml_based_count: usize,
    pub rule_based_pct: f32,
}

/// Fitted vectorizer plus trained ensemble, always replaced together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedModel {
    pub vectorizer: TfidfVectorizer,
    pub ensemble: StumpEnsemble,
}

impl LearnedModel {
    /// Predict `(category, probability)` for a batch of narrations.
    pub fn predict_batch<S: AsRef<str>>(&self, narrations: &[S]) -> Vec<(String, f32)> {
        let features = self.vectorizer.transform_batch(narrations);
        features
            .iter()
            .map(|row| {
                let (idx, prob) = self.ensemble.predict(row);
                (self.ensemble.classes[idx].clone(), prob)
            })
            .collect()
    }
}

/// Outcome of a fallback training attempt.
///
/// Skip variants leave the existing model (if any) unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainOutcome {
    /// A new model was fitted and swapped in.
    Trained { samples: usize, classes: usize },
    /// Too few labeled rows.
    SkippedTooFewSamples { labeled: usize },
    /// Every labeled row carries the same category; there is nothing for a
    /// multi-class model to separate.
    SkippedSingleClass { labeled: usize },
    /// The labeled narrations produced no usable vocabulary terms.
    SkippedEmptyVocabulary { labeled: usize },
}

/// Hybrid rule-based + learned classifier over transaction narrations.
#[derive(Debug)]
pub struct AdaptiveClassifier {
    rules: RuleSet,
    compiled: CompiledRules,
    learned: Option<LearnedModel>,
    stats: ClassifierRunStats,
}

impl AdaptiveClassifier {
    /// Build an engine from a validated rule set.
    pub fn new(rules: RuleSet) -> Result<Self, RulesError> {
        let compiled = rules.compile()?;
        Ok(Self {
            rules,
            compiled,
            learned: None,
            stats: ClassifierRunStats::default(),
        })
    }

    /// Build an engine from a TOML rules file.
    pub fn from_rules_file(path: &std::path::Path) -> Result<Self, RulesError> {
        Self::new(RuleSet::load(path)?)
    }

    /// Rebuild an engine from persisted parts.
    pub(crate) fn from_parts(
        rules: RuleSet,
        learned: Option<LearnedModel>,
    ) -> Result<Self, RulesError> {
        let mut engine = Self::new(rules)?;
        engine.learned = learned;
        Ok(engine)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn compiled_rules(&self) -> &CompiledRules {
        &self.compiled
    }

    pub fn learned_model(&self) -> Option<&LearnedModel> {
        self.learned.as_ref()
    }

    pub fn has_model(&self) -> bool {
        self.learned.is_some()
    }

    /// Counters from the most recent batch run.
    pub fn stats(&self) -> &ClassifierRunStats {
        &self.stats
    }

    /// Score one narration against the rule set.
    pub fn keyword_match(&self, text: &str) -> matcher::MatchOutcome {
        matcher::keyword_match(&self.compiled, text)
    }

    /// Classify one narration.
    ///
    /// Single-item classification is rule-based only; the learned fallback is
    /// consulted exclusively by `classify_batch`.
    pub fn classify_single(&self, text: &str, amount: Option<f64>) -> ClassificationResult {
        let outcome = matcher::keyword_match(&self.compiled, text);
        ClassificationResult {
            narration: text.to_string(),
            amount,
            needs_review: matcher::needs_review(&self.compiled, outcome.confidence),
            category: outcome.category,
            confidence: outcome.confidence,
            matched_keywords: outcome.matched_keywords,
            method: Method::RuleBased,
        }
    }

    /// Classify a batch of records, delegating low-confidence rows to the
    /// learned fallback when one is available.
    ///
    /// Output order matches input order and every input produces exactly one
    /// result. Without a trained model the fallback step is a no-op and all
    /// rows stay rule-based.
    pub fn classify_batch(&mut self, records: &[TransactionRecord]) -> Vec<ClassificationResult> {
        let mut results: Vec<ClassificationResult> = records
            .iter()
            .map(|record| self.classify_single(&record.narration, record.amount))
            .collect();

        if let Some(learned) = &self.learned {
            let low_confidence: Vec<usize> = results
                .iter()
                .enumerate()
                .filter(|(_, result)| result.confidence < self.compiled.unknown_threshold)
                .map(|(idx, _)| idx)
                .collect();
            if !low_confidence.is_empty() {
                let narrations: Vec<&str> = low_confidence
                    .iter()
                    .map(|&idx| results[idx].narration.as_str())
                    .collect();
                let predictions = learned.predict_batch(&narrations);
                for (&idx, (category, confidence)) in low_confidence.iter().zip(predictions) {
                    let result = &mut results[idx];
                    result.category = category;
                    result.confidence = confidence;
                    result.method = Method::MlBased;
                }
            }
        }

        for result in &mut results {
            result.needs_review = matcher::needs_review(&self.compiled, result.confidence);
        }

        let ml_based_count = results
            .iter()
            .filter(|result| result.method == Method::MlBased)
            .count();
        let total = results.len();
        let rule_based_count = total - ml_based_count;
        self.stats = ClassifierRunStats {
            total_classified: total,
            rule_based_count,
            ml_based_count,
            rule_based_pct: if total == 0 {
                0.0
            } else {
                rule_based_count as f32 / total as f32
            },
        };

        results
    }

    /// Train the learned fallback on previously labeled results.
    ///
    /// Unknown rows are excluded. Degenerate corpora (too few labeled rows, a
    /// single distinct category, or an empty vocabulary) are reported as
    /// skipped and any existing model stays in place. Samples are weighted by
    /// absolute amount, normalized to sum to one, so larger transactions
    /// influence the fit more. On success the vectorizer and ensemble are
    /// swapped in together.
    pub fn train_fallback(
        &mut self,
        results: &[ClassificationResult],
    ) -> Result<TrainOutcome, String> {
        let labeled: Vec<&ClassificationResult> =
            results.iter().filter(|r| !r.is_unknown()).collect();
        if labeled.len() < MIN_TRAIN_SAMPLES {
            tracing::warn!(
                labeled = labeled.len(),
                required = MIN_TRAIN_SAMPLES,
                "Not enough labeled data for fallback training; skipping"
            );
            return Ok(TrainOutcome::SkippedTooFewSamples {
                labeled: labeled.len(),
            });
        }

        let class_names: Vec<String> = labeled
            .iter()
            .map(|r| r.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if class_names.len() < 2 {
            tracing::warn!(
                labeled = labeled.len(),
                "All labeled rows share one category; skipping fallback training"
            );
            return Ok(TrainOutcome::SkippedSingleClass {
                labeled: labeled.len(),
            });
        }

        let narrations: Vec<String> = labeled.iter().map(|r| r.narration.clone()).collect();
        let vectorizer = TfidfVectorizer::fit(&narrations, DEFAULT_MAX_FEATURES);
        if vectorizer.feature_len() == 0 {
            tracing::warn!(
                labeled = labeled.len(),
                "Labeled narrations produced no vocabulary terms; skipping fallback training"
            );
            return Ok(TrainOutcome::SkippedEmptyVocabulary {
                labeled: labeled.len(),
            });
        }
        let class_index: BTreeMap<&str, usize> = class_names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.as_str(), idx))
            .collect();

        let x = vectorizer.transform_batch(&narrations);
        let y: Vec<usize> = labeled
            .iter()
            .map(|r| class_index[r.category.as_str()])
            .collect();
        let weights = amount_weights(&labeled);

        let dataset = TrainingSet {
            feature_len: vectorizer.feature_len(),
            classes: class_names,
            x,
            y,
            weights,
        };
        let ensemble = train_stump_ensemble(&dataset, &TrainOptions::default())?;

        let samples = labeled.len();
        let classes = ensemble.classes.len();
        self.learned = Some(LearnedModel {
            vectorizer,
            ensemble,
        });
        tracing::info!(samples, classes, "Fallback model trained");
        Ok(TrainOutcome::Trained { samples, classes })
    }

    /// Cluster unmatched narrations into candidate categories.
    ///
    /// Advisory only; the rule set is never mutated.
    pub fn discover_new_categories(
        &self,
        unknown_texts: &[String],
    ) -> Result<BTreeMap<String, DiscoveredCategory>, String> {
        discovery::discover_new_categories(unknown_texts)
    }
}

/// Per-sample weights proportional to |amount|, normalized to sum to one.
///
/// Records without an amount contribute unit magnitude before normalization;
/// if no record carries any mass the weights fall back to uniform.
fn amount_weights(labeled: &[&ClassificationResult]) -> Vec<f32> {
    let magnitudes: Vec<f32> = labeled
        .iter()
        .map(|r| r.amount.map(|a| a.abs() as f32).unwrap_or(1.0))
        .collect();
    let total: f32 = magnitudes.iter().sum();
    if total > 0.0 {
        magnitudes.into_iter().map(|m| m / total).collect()
    } else {
        vec![1.0 / labeled.len().max(1) as f32; labeled.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleSet;

    const TEST_RULES: &str = r#"
unknown_threshold = 0.3
review_threshold = 0.5

[categories.Healthcare]
keywords = ["pharmacy", "doctor", "prescription"]
weight = 1.5

[categories.Groceries]
keywords = ["walmart", "grocery", "supermarket"]

[categories.Transportation]
keywords = ["uber", "taxi", "lyft"]
"#;

    fn engine() -> AdaptiveClassifier {
        AdaptiveClassifier::new(RuleSet::from_toml_str(TEST_RULES).unwrap()).unwrap()
    }

    fn training_batch() -> Vec<TransactionRecord> {
        let rows: [(&str, f64); 12] = [
            ("cvs pharmacy prescription pickup", 45.0),
            ("walgreens pharmacy medicine", 30.0),
            ("doctor visit copay", 120.0),
            ("prescription refill pharmacy", 25.0),
            ("pharmacy doctor consultation", 80.0),
            ("walmart grocery shopping", 125.5),
            ("grocery run walmart", 60.0),
            ("supermarket weekly grocery", 90.0),
            ("walmart supermarket trip", 70.0),
            ("uber ride downtown", 28.0),
            ("lyft ride airport", 42.0),
            ("taxi uber night ride", 18.0),
        ];
        rows.iter()
            .map(|(narration, amount)| TransactionRecord::new(*narration, Some(*amount)))
            .collect()
    }

    #[test]
    fn classify_single_is_rule_based() {
        let engine = engine();
        let result = engine.classify_single("cvs pharmacy prescription", Some(45.0));
        assert_eq!(result.category, "Healthcare");
        assert_eq!(result.method, Method::RuleBased);
        assert_eq!(result.amount, Some(45.0));
        assert!(result.confidence > 0.5);
    }

    #[test]
    fn classify_single_without_amount() {
        let engine = engine();
        let result = engine.classify_single("walmart grocery", None);
        assert_eq!(result.category, "Groceries");
        assert_eq!(result.amount, None);
    }

    #[test]
    fn review_flag_follows_confidence() {
        let engine = engine();
        let result = engine.classify_single("cvs pharmacy prescription pickup", None);
        // 1.5 * 2 matches / 4 words = 0.75, above the review threshold.
        assert!(!result.needs_review);
        let weak = engine.classify_single("payment to that one walmart far away from here", None);
        assert!(weak.needs_review);
    }

    #[test]
    fn batch_preserves_length_and_order() {
        let mut engine = engine();
        let records = training_batch();
        let results = engine.classify_batch(&records);
        assert_eq!(results.len(), records.len());
        for (record, result) in records.iter().zip(&results) {
            assert_eq!(record.narration, result.narration);
        }
    }

    #[test]
    fn batch_without_model_stays_rule_based() {
        let mut engine = engine();
        let records = vec![
            TransactionRecord::new("payment to acme corp", Some(100.0)),
            TransactionRecord::new("cvs pharmacy prescription", Some(45.0)),
        ];
        let results = engine.classify_batch(&records);
        assert!(results.iter().all(|r| r.method == Method::RuleBased));
        assert_eq!(results[0].category, UNKNOWN_CATEGORY);
    }

    #[test]
    fn stats_reset_per_batch() {
        let mut engine = engine();
        let records = training_batch();
        engine.classify_batch(&records);
        assert_eq!(engine.stats().total_classified, 12);
        assert_eq!(engine.stats().rule_based_count, 12);
        assert_eq!(engine.stats().rule_based_pct, 1.0);

        engine.classify_batch(&records[..3]);
        assert_eq!(engine.stats().total_classified, 3);
    }

    #[test]
    fn training_skips_below_minimum() {
        let mut engine = engine();
        let records = training_batch();
        let results = engine.classify_batch(&records[..4]);
        let outcome = engine.train_fallback(&results).unwrap();
        assert_eq!(outcome, TrainOutcome::SkippedTooFewSamples { labeled: 4 });
        assert!(!engine.has_model());
    }

    #[test]
    fn training_skips_single_class() {
        let rules = RuleSet::from_toml_str(
            r#"
unknown_threshold = 0.3
review_threshold = 0.5

[categories.Healthcare]
keywords = ["pharmacy", "doctor", "prescription"]
weight = 1.5
"#,
        )
        .unwrap();
        let mut engine = AdaptiveClassifier::new(rules).unwrap();
        let records: Vec<TransactionRecord> = (0..12)
            .map(|_| TransactionRecord::new("cvs pharmacy prescription pickup", Some(40.0)))
            .collect();
        let results = engine.classify_batch(&records);
        let outcome = engine.train_fallback(&results).unwrap();
        assert_eq!(outcome, TrainOutcome::SkippedSingleClass { labeled: 12 });
        assert!(!engine.has_model());
    }

    #[test]
    fn training_skips_empty_vocabulary() {
        let rules = RuleSet::from_toml_str(
            r#"
unknown_threshold = 0.3
review_threshold = 0.5

[categories.Tv]
keywords = ["tv"]

[categories.Pc]
keywords = ["pc"]
"#,
        )
        .unwrap();
        let mut engine = AdaptiveClassifier::new(rules).unwrap();
        let mut records = Vec::new();
        for _ in 0..6 {
            records.push(TransactionRecord::new("tv hd", Some(10.0)));
            records.push(TransactionRecord::new("pc 4k", Some(20.0)));
        }
        let results = engine.classify_batch(&records);
        // Every token is too short to enter the vectorizer vocabulary.
        let outcome = engine.train_fallback(&results).unwrap();
        assert_eq!(outcome, TrainOutcome::SkippedEmptyVocabulary { labeled: 12 });
        assert!(!engine.has_model());
    }

    #[test]
    fn training_excludes_unknown_rows() {
        let mut engine = engine();
        let mut records = training_batch();
        records.push(TransactionRecord::new("payment to acme corp", Some(10.0)));
        let results = engine.classify_batch(&records);
        let outcome = engine.train_fallback(&results).unwrap();
        assert_eq!(
            outcome,
            TrainOutcome::Trained {
                samples: 12,
                classes: 3
            }
        );
        assert!(engine.has_model());
    }

    #[test]
    fn fallback_reclassifies_only_low_confidence_rows() {
        let mut engine = engine();
        let records = training_batch();
        let labeled = engine.classify_batch(&records);
        engine.train_fallback(&labeled).unwrap();

        let mut batch = records.clone();
        batch.push(TransactionRecord::new(
            "prescription pickup at the corner store on main street",
            Some(33.0),
        ));
        let results = engine.classify_batch(&batch);

        for (before, after) in labeled.iter().zip(&results) {
            if before.confidence >= 0.3 {
                assert_eq!(after.method, Method::RuleBased);
                assert_eq!(after.category, before.category);
                assert_eq!(after.confidence, before.confidence);
            }
        }
        let tail = results.last().unwrap();
        assert_eq!(tail.method, Method::MlBased);
        assert_ne!(tail.category, UNKNOWN_CATEGORY);
        assert!(engine.stats().ml_based_count >= 1);
    }

    #[test]
    fn training_replaces_model_atomically() {
        let mut engine = engine();
        let records = training_batch();
        let results = engine.classify_batch(&records);
        engine.train_fallback(&results).unwrap();
        let first = engine.learned_model().cloned().unwrap();

        // A skipped retrain must leave the previous model untouched.
        let outcome = engine.train_fallback(&results[..2]).unwrap();
        assert!(matches!(outcome, TrainOutcome::SkippedTooFewSamples { .. }));
        assert_eq!(engine.learned_model(), Some(&first));
    }
}
