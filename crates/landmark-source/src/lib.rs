//! Landmark Source Library
//!
//! Input contract of the drowsiness monitor. A landmark detector (external) turns
//! camera or video frames into normalized 3D face landmarks; this crate models
//! those frames and provides sources that feed them to the pipeline:
//! - JSON-lines replay of recorded landmark streams
//! - In-memory sources for tests and demos

pub mod frame;
pub mod source;

pub use frame::{Landmark, LandmarkFrame, SourceFrame};
pub use source::{JsonLinesSource, LandmarkSource, VecSource};

use thiserror::Error;

/// Source error types. Every source error is terminal for a pipeline run.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to open landmark source: {0}")]
    Open(String),

    #[error("I/O error while reading frames: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed frame at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Landmark source disconnected: {0}")]
    Disconnected(String),
}
