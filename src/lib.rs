//! Library exports for the adaptive narration classification engine.
/// Application directory helpers.
pub mod app_dirs;
/// Rule-based and fallback classification engine.
pub mod classify;
/// Unsupervised discovery of candidate categories.
pub mod discovery;
/// Logging setup.
pub mod logging;
/// Learned fallback model components.
pub mod ml;
/// Model bundle persistence.
pub mod persist;
/// Transaction record I/O.
pub mod records;
/// Keyword rule configuration.
pub mod rules;
