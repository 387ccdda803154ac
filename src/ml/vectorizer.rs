//! TF-IDF bag-of-n-grams vectorizer for narration text.
//!
//! Fits a capped vocabulary of word 1- to 3-grams and produces L2-normalized
//! feature vectors. Normalized vectors keep Euclidean distance monotone in
//! cosine distance, which the discovery clustering relies on.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Vocabulary cap used for the fallback classifier.
pub const DEFAULT_MAX_FEATURES: usize = 500;

/// Largest n-gram length included in the vocabulary.
pub const NGRAM_MAX: usize = 3;

/// Tokens shorter than this are dropped before n-gram extraction.
const MIN_TOKEN_LEN: usize = 3;

/// Fitted TF-IDF vectorizer state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    /// N-gram to feature index.
    vocabulary: BTreeMap<String, usize>,
    /// Smoothed inverse document frequency per feature index.
    idf: Vec<f32>,
    /// Vocabulary size cap used at fit time.
    max_features: usize,
}

impl TfidfVectorizer {
    /// Fit a vectorizer on a corpus of documents.
    ///
    /// The vocabulary keeps the `max_features` most frequent n-grams; ties
    /// are broken lexicographically so fitting is deterministic.
    pub fn fit(documents: &[String], max_features: usize) -> Self {
        let mut doc_frequency: BTreeMap<String, usize> = BTreeMap::new();
        let mut total_frequency: BTreeMap<String, usize> = BTreeMap::new();

        for document in documents {
            let grams = ngrams(document);
            let unique: BTreeSet<&String> = grams.iter().collect();
            for gram in &grams {
                *total_frequency.entry(gram.clone()).or_insert(0) += 1;
            }
            for gram in unique {
                *doc_frequency.entry(gram.clone()).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(&String, &usize)> = total_frequency.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        let mut vocabulary = BTreeMap::new();
        for (idx, (gram, _)) in ranked.into_iter().take(max_features).enumerate() {
            vocabulary.insert(gram.clone(), idx);
        }

        let n_docs = documents.len() as f32;
        let mut idf = vec![0.0f32; vocabulary.len()];
        for (gram, &idx) in &vocabulary {
            let df = doc_frequency.get(gram).copied().unwrap_or(1) as f32;
            idf[idx] = ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0;
        }

        Self {
            vocabulary,
            idf,
            max_features,
        }
    }

    /// Transform one document into an L2-normalized TF-IDF vector.
    pub fn transform(&self, document: &str) -> Vec<f32> {
        let mut tf = vec![0.0f32; self.vocabulary.len()];
        for gram in ngrams(document) {
            if let Some(&idx) = self.vocabulary.get(&gram) {
                tf[idx] += 1.0;
            }
        }

        let total: f32 = tf.iter().sum();
        if total > 0.0 {
            for value in &mut tf {
                *value /= total;
            }
        }

        for (value, &idf) in tf.iter_mut().zip(self.idf.iter()) {
            *value *= idf;
        }

        let norm = tf.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut tf {
                *value /= norm;
            }
        }
        tf
    }

    /// Transform a batch of documents.
    pub fn transform_batch<S: AsRef<str>>(&self, documents: &[S]) -> Vec<Vec<f32>> {
        documents
            .iter()
            .map(|doc| self.transform(doc.as_ref()))
            .collect()
    }

    /// Number of features produced by `transform`.
    pub fn feature_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Vocabulary terms ordered by feature index.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = vec![String::new(); self.vocabulary.len()];
        for (gram, &idx) in &self.vocabulary {
            names[idx] = gram.clone();
        }
        names
    }
}

/// Extract word 1- to `NGRAM_MAX`-grams from lowercased text.
fn ngrams(text: &str) -> Vec<String> {
    let tokens: Vec<String> = text
        .to_lowercase()
        .split_whitespace()
        .filter(|token| token.len() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect();

    let mut grams = Vec::new();
    for n in 1..=NGRAM_MAX {
        if tokens.len() < n {
            break;
        }
        for window in tokens.windows(n) {
            grams.push(window.join(" "));
        }
    }
    grams
}
