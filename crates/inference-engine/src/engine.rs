//! Drowsiness classifiers
//!
//! The decision tiers only ever ask a yes/no question of the classifier, so the
//! seam is a single `predict` over the four frame ratios.

use crate::InferenceError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};
use tract_onnx::prelude::*;

type RunnableOnnx = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Integer class id of the drowsy label
const DROWSY_ID: i64 = 1;
/// Class name of the drowsy label in string-labelled models
const DROWSY_NAME: &str = "Drowsy";

/// Classifier input for a single frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Mouth aspect ratio
    pub mar: f64,
    /// Mean eye aspect ratio
    pub ear: f64,
    /// Smoothed head roll in degrees
    pub roll: f64,
    /// Smoothed head pitch in degrees
    pub pitch: f64,
}

impl FeatureVector {
    pub fn new(mar: f64, ear: f64, roll: f64, pitch: f64) -> Self {
        Self { mar, ear, roll, pitch }
    }

    /// Column order the model was trained with: MAR, EAR, Roll, Pitch
    pub fn as_array(&self) -> [f32; 4] {
        [self.mar as f32, self.ear as f32, self.roll as f32, self.pitch as f32]
    }
}

/// A frame-level drowsiness predictor
pub trait DrowsinessClassifier: Send {
    /// `true` means the frame looks drowsy
    fn predict(&self, features: &FeatureVector) -> Result<bool, InferenceError>;
}

impl<C: DrowsinessClassifier + ?Sized> DrowsinessClassifier for Box<C> {
    fn predict(&self, features: &FeatureVector) -> Result<bool, InferenceError> {
        (**self).predict(features)
    }
}

/// Threshold rules standing in for a trained model
///
/// Used when no model file is configured and throughout the tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleClassifier {
    /// EAR at or below which the eyes count as heavy
    pub ear_threshold: f64,
    /// MAR at or above which the mouth counts as open
    pub mar_threshold: f64,
    /// Absolute pitch beyond which the head counts as nodding
    pub pitch_limit: f64,
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self {
            ear_threshold: 0.2,
            mar_threshold: 0.5,
            pitch_limit: 25.0,
        }
    }
}

impl RuleClassifier {
    pub fn new() -> Self {
        info!("Creating rule-based drowsiness classifier");
        Self::default()
    }
}

impl DrowsinessClassifier for RuleClassifier {
    fn predict(&self, features: &FeatureVector) -> Result<bool, InferenceError> {
        let heavy_eyes = features.ear <= self.ear_threshold;
        let open_mouth = features.mar >= self.mar_threshold;
        let nodding = features.pitch.abs() > self.pitch_limit;

        // Two signals must agree
        Ok((heavy_eyes && open_mouth) || (heavy_eyes && nodding) || (open_mouth && nodding))
    }
}

/// ONNX classifier run through tract
///
/// Expects a `[1, 4]` float input in [`FeatureVector::as_array`] order. The first
/// output is the predicted label, either a string class name or an integer id.
pub struct OnnxClassifier {
    model: RunnableOnnx,
}

impl OnnxClassifier {
    /// Load and optimize a model from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        info!("Loading drowsiness model: {}", path.display());

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_fact(0, f32::fact([1, 4]).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| InferenceError::ModelLoadError(format!("{}: {}", path.display(), e)))?;

        info!("Model loaded successfully");
        Ok(Self { model })
    }
}

/// Read the first predicted label, named (`"Drowsy"`/`"Not_drowsy"`) or numeric
fn is_drowsy_label(label: &Tensor) -> Result<bool, InferenceError> {
    if label.datum_type() == String::datum_type() {
        let names = label
            .as_slice::<String>()
            .map_err(|e| InferenceError::InvalidOutput(e.to_string()))?;
        let first = names
            .first()
            .ok_or_else(|| InferenceError::InvalidOutput("empty label tensor".to_string()))?;
        return Ok(first == DROWSY_NAME);
    }

    let ids = label
        .cast_to::<i64>()
        .map_err(|e| InferenceError::InvalidOutput(e.to_string()))?;
    let ids = ids
        .as_slice::<i64>()
        .map_err(|e| InferenceError::InvalidOutput(e.to_string()))?;
    let first = ids
        .first()
        .ok_or_else(|| InferenceError::InvalidOutput("empty label tensor".to_string()))?;
    Ok(*first == DROWSY_ID)
}

impl DrowsinessClassifier for OnnxClassifier {
    fn predict(&self, features: &FeatureVector) -> Result<bool, InferenceError> {
        let input = Tensor::from_shape(&[1, 4], &features.as_array()[..])
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;
        let label = outputs
            .first()
            .ok_or_else(|| InferenceError::InvalidOutput("model produced no outputs".to_string()))?;

        let drowsy = is_drowsy_label(label)?;
        debug!("Model predicted drowsy={} for {:?}", drowsy, features);
        Ok(drowsy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_order() {
        let features = FeatureVector::new(0.6, 0.25, -3.0, 12.0);
        assert_eq!(features.as_array(), [0.6, 0.25, -3.0, 12.0]);
    }

    #[test]
    fn test_rule_classifier_alert_face() {
        let classifier = RuleClassifier::new();
        let features = FeatureVector::new(0.1, 0.3, 0.0, 5.0);
        assert!(!classifier.predict(&features).unwrap());
    }

    #[test]
    fn test_rule_classifier_heavy_eyes_and_yawn() {
        let classifier = RuleClassifier::new();
        let features = FeatureVector::new(0.7, 0.15, 0.0, 5.0);
        assert!(classifier.predict(&features).unwrap());
    }

    #[test]
    fn test_rule_classifier_single_signal_is_not_enough() {
        let classifier = RuleClassifier::new();
        assert!(!classifier.predict(&FeatureVector::new(0.1, 0.15, 0.0, 5.0)).unwrap());
        assert!(!classifier.predict(&FeatureVector::new(0.7, 0.3, 0.0, 5.0)).unwrap());
        assert!(!classifier.predict(&FeatureVector::new(0.1, 0.3, 0.0, 40.0)).unwrap());
    }

    #[test]
    fn test_boxed_classifier_delegates() {
        let classifier: Box<dyn DrowsinessClassifier> = Box::new(RuleClassifier::new());
        let features = FeatureVector::new(0.7, 0.15, 0.0, 5.0);
        assert!(classifier.predict(&features).unwrap());
    }

    #[test]
    fn test_numeric_labels() {
        assert!(is_drowsy_label(&tensor1(&[1i64])).unwrap());
        assert!(!is_drowsy_label(&tensor1(&[0i64])).unwrap());
        // Integer outputs of other widths are widened first
        assert!(is_drowsy_label(&tensor1(&[1i32])).unwrap());
    }

    #[test]
    fn test_named_labels() {
        assert!(is_drowsy_label(&tensor1(&["Drowsy".to_string()])).unwrap());
        assert!(!is_drowsy_label(&tensor1(&["Not_drowsy".to_string()])).unwrap());
    }

    #[test]
    fn test_empty_label_tensor() {
        let result = is_drowsy_label(&tensor1::<i64>(&[]));
        assert!(matches!(result, Err(InferenceError::InvalidOutput(_))));
    }

    #[test]
    fn test_onnx_load_missing_file() {
        let result = OnnxClassifier::load("/nonexistent/drowsiness.onnx");
        assert!(matches!(result, Err(InferenceError::ModelLoadError(_))));
    }
}
