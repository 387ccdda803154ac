//! Rule-based keyword matching and the confidence policy.
//!
//! `keyword_match` is a pure function of the narration text and the compiled
//! rules: the same input always yields the same outcome.

use std::collections::BTreeSet;

use crate::rules::{CompiledCategory, CompiledRules, UNKNOWN_CATEGORY};

/// Outcome of matching one narration against the rule set.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub category: String,
    /// Normalized confidence in `[0, 1]`.
    pub confidence: f32,
    /// Keywords that contributed to the score.
    pub matched_keywords: BTreeSet<String>,
}

impl MatchOutcome {
    fn unknown() -> Self {
        Self {
            category: UNKNOWN_CATEGORY.to_string(),
            confidence: 0.0,
            matched_keywords: BTreeSet::new(),
        }
    }
}

/// Score one narration against every category and pick the best.
///
/// Scoring: each matching keyword contributes the category weight, reduced by
/// `partial_match_penalty` when it only matches as a substring. When at least
/// two distinct keywords match, `multi_word_bonus` scales the category score.
/// Confidence is the winning score divided by the narration word count,
/// clamped to `[0, 1]`; a `min_confidence` floor forces Unknown. Ties between
/// categories keep the one declared first in the rules document.
pub fn keyword_match(rules: &CompiledRules, text: &str) -> MatchOutcome {
    let lowered = text.to_lowercase();
    let word_count = lowered.split_whitespace().count();
    if word_count == 0 {
        return MatchOutcome::unknown();
    }

    let mut best: Option<(f32, &CompiledCategory, BTreeSet<String>)> = None;
    for category in &rules.categories {
        let (score, matched) = score_category(rules, category, &lowered);
        if matched.is_empty() || score <= 0.0 {
            continue;
        }
        let replace = match &best {
            Some((best_score, _, _)) => score > *best_score,
            None => true,
        };
        if replace {
            best = Some((score, category, matched));
        }
    }

    let Some((score, category, matched_keywords)) = best else {
        return MatchOutcome::unknown();
    };
    let confidence = (score / word_count as f32).clamp(0.0, 1.0);
    if confidence < rules.matching.min_confidence() {
        return MatchOutcome::unknown();
    }
    MatchOutcome {
        category: category.name.clone(),
        confidence,
        matched_keywords,
    }
}

fn score_category(
    rules: &CompiledRules,
    category: &CompiledCategory,
    lowered: &str,
) -> (f32, BTreeSet<String>) {
    let penalty = rules.matching.partial_match_penalty();
    let mut score = 0.0f32;
    let mut matched = BTreeSet::new();
    for keyword in &category.keywords {
        if keyword.word.is_match(lowered) {
            score += category.weight;
        } else if lowered.contains(&keyword.text) {
            score += category.weight * penalty;
        } else {
            continue;
        }
        matched.insert(keyword.text.clone());
    }
    if matched.len() >= 2 {
        score *= rules.matching.multi_word_bonus();
    }
    (score, matched)
}

/// Flag results whose confidence falls below the review threshold.
///
/// Applied uniformly to rule-based and ml-based results.
pub fn needs_review(rules: &CompiledRules, confidence: f32) -> bool {
    confidence < rules.review_threshold
}
