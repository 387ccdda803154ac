//! Gradient-boosted decision stumps for the learned fallback classifier.

mod model;
mod train;

pub use model::{Stump, StumpEnsemble, softmax};
pub use train::{TrainOptions, TrainingSet, train_stump_ensemble};
