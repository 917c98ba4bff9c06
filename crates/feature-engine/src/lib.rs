//! Feature Engineering Engine
//!
//! Derives per-frame geometric fatigue indicators from face landmarks:
//! eye aspect ratio, mouth aspect ratio and head roll/pitch.

mod features;
mod layout;
pub mod synthetic;

pub use features::{
    EyeClosure, EyeRatios, FaceMetric, HeadAngle, HeadAngles, MouthAspect, RatioExtractor,
    RatioSample,
};
pub use layout::{AspectPairs, LandmarkLayout};

use thiserror::Error;

/// Errors during feature extraction.
///
/// Both variants mean the frame yields no usable sample; callers treat them like
/// a frame without a detected face.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("Landmark {index} missing from frame with {available} points")]
    MissingLandmark { index: usize, available: usize },

    #[error("Degenerate geometry: {0}")]
    Degenerate(&'static str),
}
