//! Keyword rule configuration for narration classification.
//!
//! Rules are loaded once from a TOML document, validated eagerly, and then
//! compiled into whole-word matchers. The parsed `RuleSet` stays immutable
//! for the lifetime of a classifier instance; changing rules means building
//! a new instance.

use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Category assigned when no rule produces a usable score.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Errors that can occur while loading or compiling a rule set.
#[derive(Debug, Error)]
pub enum RulesError {
    /// Rules file could not be read.
    #[error("Failed to read rules file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Rules document was not valid TOML or missed required keys.
    #[error("Failed to parse rules document: {0}")]
    Parse(#[from] Box<toml::de::Error>),
    /// No categories were declared.
    #[error("Rules must declare at least one category")]
    NoCategories,
    /// A category declared an empty keyword list.
    #[error("Category '{0}' has no keywords")]
    EmptyKeywords(String),
    /// A category declared a blank keyword.
    #[error("Category '{0}' contains a blank keyword")]
    BlankKeyword(String),
    /// A category declared a negative weight.
    #[error("Category '{0}' has a negative weight")]
    NegativeWeight(String),
    /// A threshold fell outside `[0, 1]`.
    #[error("Threshold '{name}' must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f32 },
    /// A matching multiplier was negative.
    #[error("Matching option '{name}' must be non-negative, got {value}")]
    NegativeMultiplier { name: &'static str, value: f32 },
    /// A keyword could not be compiled into a word-boundary pattern.
    #[error("Failed to compile keyword pattern for category '{category}': {source}")]
    Pattern {
        category: String,
        source: regex::Error,
    },
}

/// Keywords and weight for a single category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Keywords matched against lowercased narration text.
    pub keywords: Vec<String>,
    /// Score contributed by each matching keyword.
    #[serde(default = "default_weight")]
    pub weight: f32,
}

fn default_weight() -> f32 {
    1.0
}

/// Optional score adjustments from the `matching` block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchingOptions {
    /// Confidence floor below which a result is forced to Unknown.
    pub min_confidence: Option<f32>,
    /// Multiplier applied when a keyword matches as a substring only.
    pub partial_match_penalty: Option<f32>,
    /// Multiplier applied when at least two distinct keywords match.
    pub multi_word_bonus: Option<f32>,
}

impl MatchingOptions {
    pub fn min_confidence(&self) -> f32 {
        self.min_confidence.unwrap_or(0.0)
    }

    pub fn partial_match_penalty(&self) -> f32 {
        self.partial_match_penalty.unwrap_or(1.0)
    }

    pub fn multi_word_bonus(&self) -> f32 {
        self.multi_word_bonus.unwrap_or(1.0)
    }
}

/// Category list preserving declaration order from the rules document.
///
/// Declaration order is load-bearing: score ties between categories are
/// broken in favor of the category declared first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Categories(pub Vec<(String, CategoryRule)>);

impl Categories {
    pub fn iter(&self) -> impl Iterator<Item = &(String, CategoryRule)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&CategoryRule> {
        self.0
            .iter()
            .find(|(category, _)| category == name)
            .map(|(_, rule)| rule)
    }
}

impl Serialize for Categories {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, rule) in &self.0 {
            map.serialize_entry(name, rule)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Categories {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CategoriesVisitor;

        impl<'de> Visitor<'de> for CategoriesVisitor {
            type Value = Categories;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of category name to rule")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, rule)) = access.next_entry::<String, CategoryRule>()? {
                    entries.push((name, rule));
                }
                Ok(Categories(entries))
            }
        }

        deserializer.deserialize_map(CategoriesVisitor)
    }
}

/// Parsed rules document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Categories in declaration order.
    pub categories: Categories,
    /// Optional matching adjustments.
    #[serde(default)]
    pub matching: MatchingOptions,
    /// Confidence below which the learned fallback takes over.
    pub unknown_threshold: f32,
    /// Confidence below which results are flagged for review.
    pub review_threshold: f32,
}

impl RuleSet {
    /// Load and validate a rules document from a TOML file.
    pub fn load(path: &Path) -> Result<Self, RulesError> {
        let text = std::fs::read_to_string(path).map_err(|source| RulesError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate a rules document from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, RulesError> {
        let rules: RuleSet = toml::from_str(text).map_err(Box::new)?;
        rules.validate()?;
        Ok(rules)
    }

    /// Check structural invariants of the rule set.
    pub fn validate(&self) -> Result<(), RulesError> {
        if self.categories.is_empty() {
            return Err(RulesError::NoCategories);
        }
        for (name, rule) in self.categories.iter() {
            if rule.keywords.is_empty() {
                return Err(RulesError::EmptyKeywords(name.clone()));
            }
            if rule.keywords.iter().any(|kw| kw.trim().is_empty()) {
                return Err(RulesError::BlankKeyword(name.clone()));
            }
            if rule.weight < 0.0 {
                return Err(RulesError::NegativeWeight(name.clone()));
            }
        }
        validate_threshold("unknown_threshold", self.unknown_threshold)?;
        validate_threshold("review_threshold", self.review_threshold)?;
        if let Some(min_confidence) = self.matching.min_confidence {
            validate_threshold("matching.min_confidence", min_confidence)?;
        }
        if let Some(penalty) = self.matching.partial_match_penalty {
            validate_multiplier("matching.partial_match_penalty", penalty)?;
        }
        if let Some(bonus) = self.matching.multi_word_bonus {
            validate_multiplier("matching.multi_word_bonus", bonus)?;
        }
        Ok(())
    }

    /// Compile keyword patterns for matching.
    pub fn compile(&self) -> Result<CompiledRules, RulesError> {
        self.validate()?;
        let mut categories = Vec::with_capacity(self.categories.len());
        for (name, rule) in self.categories.iter() {
            let mut keywords = Vec::with_capacity(rule.keywords.len());
            for keyword in &rule.keywords {
                let text = keyword.trim().to_lowercase();
                let pattern = format!(r"\b{}\b", regex::escape(&text));
                let word = Regex::new(&pattern).map_err(|source| RulesError::Pattern {
                    category: name.clone(),
                    source,
                })?;
                keywords.push(KeywordPattern { text, word });
            }
            categories.push(CompiledCategory {
                name: name.clone(),
                weight: rule.weight,
                keywords,
            });
        }
        Ok(CompiledRules {
            categories,
            matching: self.matching,
            unknown_threshold: self.unknown_threshold,
            review_threshold: self.review_threshold,
        })
    }
}

fn validate_threshold(name: &'static str, value: f32) -> Result<(), RulesError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(RulesError::ThresholdOutOfRange { name, value });
    }
    Ok(())
}

fn validate_multiplier(name: &'static str, value: f32) -> Result<(), RulesError> {
    if !value.is_finite() || value < 0.0 {
        return Err(RulesError::NegativeMultiplier { name, value });
    }
    Ok(())
}

/// A keyword with its precompiled word-boundary pattern.
#[derive(Debug, Clone)]
pub struct KeywordPattern {
    /// Lowercased keyword text.
    pub text: String,
    /// Whole-word matcher for the keyword.
    pub word: Regex,
}

/// A category with compiled keyword matchers.
#[derive(Debug, Clone)]
pub struct CompiledCategory {
    pub name: String,
    pub weight: f32,
    pub keywords: Vec<KeywordPattern>,
}

/// Rule set compiled for matching, in declaration order.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    pub categories: Vec<CompiledCategory>,
    pub matching: MatchingOptions,
    pub unknown_threshold: f32,
    pub review_threshold: f32,
}
