//! Learned fallback classifier components.
/// Boosted decision stump ensemble.
pub mod gbdt_stump;
/// TF-IDF n-gram vectorizer.
pub mod vectorizer;
