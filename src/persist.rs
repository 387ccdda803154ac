//! Model bundle persistence.
//!
//! A bundle carries the rule set together with the learned fallback state so
//! a reloaded engine reproduces the saving engine's classifications exactly.
//! Compiled keyword matchers are rebuilt on load rather than serialized.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::{AdaptiveClassifier, LearnedModel};
use crate::rules::{RuleSet, RulesError};

/// Bundle format version written by this crate.
pub const BUNDLE_FORMAT_VERSION: i64 = 1;

/// Errors that can occur while saving or loading a bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Failed to open bundle {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported bundle format version {0}")]
    UnsupportedVersion(i64),
    #[error("Bundle contains an invalid model: {0}")]
    InvalidModel(String),
    #[error(transparent)]
    Rules(#[from] RulesError),
}

/// Serialized engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub format_version: i64,
    pub rules: RuleSet,
    /// Present only when a fallback model has been trained.
    pub learned: Option<LearnedModel>,
}

impl ModelBundle {
    /// Snapshot an engine into a bundle.
    pub fn from_engine(engine: &AdaptiveClassifier) -> Self {
        Self {
            format_version: BUNDLE_FORMAT_VERSION,
            rules: engine.rules().clone(),
            learned: engine.learned_model().cloned(),
        }
    }

    /// Rebuild an engine, recompiling rules and validating the model.
    pub fn into_engine(self) -> Result<AdaptiveClassifier, BundleError> {
        if self.format_version != BUNDLE_FORMAT_VERSION {
            return Err(BundleError::UnsupportedVersion(self.format_version));
        }
        if let Some(learned) = &self.learned {
            learned.ensemble.validate().map_err(BundleError::InvalidModel)?;
        }
        Ok(AdaptiveClassifier::from_parts(self.rules, self.learned)?)
    }
}

/// Write a bundle as JSON. The file handle is scoped to this call.
pub fn save_bundle(path: &Path, bundle: &ModelBundle) -> Result<(), BundleError> {
    let file = File::create(path).map_err(|source| BundleError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let writer = BufWriter::new(file);
    serde_json::to_writer(writer, bundle)?;
    Ok(())
}

/// Read a bundle from JSON. The file handle is scoped to this call.
pub fn load_bundle(path: &Path) -> Result<ModelBundle, BundleError> {
    let file = File::open(path).map_err(|source| BundleError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    let bundle: ModelBundle = serde_json::from_reader(reader)?;
    Ok(bundle)
}

/// Save an engine's state to a bundle file.
pub fn save_engine(path: &Path, engine: &AdaptiveClassifier) -> Result<(), BundleError> {
    save_bundle(path, &ModelBundle::from_engine(engine))
}

/// Load an engine from a bundle file.
pub fn load_engine(path: &Path) -> Result<AdaptiveClassifier, BundleError> {
    load_bundle(path)?.into_engine()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleSet;
    use tempfile::tempdir;

    const RULES: &str = r#"
unknown_threshold = 0.3
review_threshold = 0.5

[categories.Healthcare]
keywords = ["pharmacy", "doctor"]
weight = 1.5
"#;

    #[test]
    fn saves_and_loads_rules_only_bundle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bundle.json");
        let engine =
            AdaptiveClassifier::new(RuleSet::from_toml_str(RULES).unwrap()).unwrap();

        save_engine(&path, &engine).unwrap();
        let loaded = load_engine(&path).unwrap();

        assert!(!loaded.has_model());
        assert_eq!(loaded.rules(), engine.rules());
        let result = loaded.classify_single("cvs pharmacy prescription pickup", None);
        assert_eq!(result.category, "Healthcare");
    }

    #[test]
    fn rejects_unknown_format_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bundle.json");
        let engine =
            AdaptiveClassifier::new(RuleSet::from_toml_str(RULES).unwrap()).unwrap();
        let mut bundle = ModelBundle::from_engine(&engine);
        bundle.format_version = 99;
        save_bundle(&path, &bundle).unwrap();

        let err = load_bundle(&path).unwrap().into_engine().unwrap_err();
        assert!(matches!(err, BundleError::UnsupportedVersion(99)));
    }

    #[test]
    fn missing_bundle_is_a_hard_failure() {
        let err = load_engine(Path::new("/nonexistent/bundle.json")).unwrap_err();
        assert!(matches!(err, BundleError::Open { .. }));
    }
}
