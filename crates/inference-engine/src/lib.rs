//! Drowsiness Inference Engine
//!
//! Wraps the pretrained drowsiness classifier behind a small trait and smooths
//! its frame-level output with a majority vote over recent predictions.

mod engine;
mod voting;

pub use engine::{DrowsinessClassifier, FeatureVector, OnnxClassifier, RuleClassifier};
pub use voting::{MajorityVote, SmoothedClassifier, SmoothedPrediction};

use thiserror::Error;

/// Errors during inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid model output: {0}")]
    InvalidOutput(String),
    #[error("Invalid voting parameters: {0}")]
    InvalidParameters(String),
}
