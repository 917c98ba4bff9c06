//! Tiered drowsiness decision
//!
//! High PERCLOS decides on its own. Only the band between the low and high
//! thresholds is handed to the smoothed classifier.

use inference_engine::{FeatureVector, SmoothedClassifier};
use serde::{Deserialize, Serialize};

/// Which rule produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionTier {
    /// PERCLOS at or above the high threshold
    HighPerclos,
    /// PERCLOS in the ambiguous band, classifier consulted
    Classifier,
    /// PERCLOS below the low threshold
    LowPerclos,
}

/// Outcome for one frame with a face
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub drowsy: bool,
    pub tier: DecisionTier,
    /// Share of drowsy votes, when the classifier was consulted
    pub vote_fraction: Option<f64>,
    /// The classifier failed and the previous smoothed decision was reused
    pub abstained: bool,
}

/// Combines the PERCLOS rule with the smoothed classifier
pub struct DecisionEngine {
    high_threshold: f64,
    low_threshold: f64,
    classifier: SmoothedClassifier,
}

impl DecisionEngine {
    pub fn new(high_threshold: f64, low_threshold: f64, classifier: SmoothedClassifier) -> Self {
        Self {
            high_threshold,
            low_threshold,
            classifier,
        }
    }

    pub fn decide(&mut self, perclos: f64, features: &FeatureVector) -> Decision {
        if perclos >= self.high_threshold {
            return Decision {
                drowsy: true,
                tier: DecisionTier::HighPerclos,
                vote_fraction: None,
                abstained: false,
            };
        }

        if perclos >= self.low_threshold {
            let prediction = self.classifier.predict(features);
            return Decision {
                drowsy: prediction.drowsy,
                tier: DecisionTier::Classifier,
                vote_fraction: Some(prediction.vote_fraction),
                abstained: prediction.abstained,
            };
        }

        Decision {
            drowsy: false,
            tier: DecisionTier::LowPerclos,
            vote_fraction: None,
            abstained: false,
        }
    }

    /// Forget every remembered prediction
    pub fn reset(&mut self) {
        self.classifier.reset();
    }
}
