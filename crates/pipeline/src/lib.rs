//! Drowsiness Pipeline
//!
//! Moves frames from a landmark source through analysis to presentation and
//! persistence. The frame loop runs on a blocking task and owns all rolling
//! state; sinks are reached through one bounded queue each.

mod coordinator;
mod fps;
mod presenter;

pub use coordinator::{EndReason, Pipeline, PipelineState, PipelineSummary, StopHandle};
pub use fps::FpsMeter;
pub use presenter::{PresentationEvent, Presenter};

use thiserror::Error;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid pipeline configuration: {0}")]
    Config(String),
    #[error("Pipeline cannot start from state {0:?}")]
    InvalidState(PipelineState),
    #[error("Pipeline task failed: {0}")]
    TaskFailed(String),
    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),
}
