//! Majority-vote smoothing of frame-level predictions

use crate::{DrowsinessClassifier, FeatureVector, InferenceError};
use ring_buffer::RingBuffer;
use tracing::{debug, warn};

/// Rolling vote over the most recent predictions
///
/// The memory starts full of `false` votes, so a fresh vote needs
/// `activation_certainty * size` drowsy predictions before it flips.
#[derive(Debug, Clone)]
pub struct MajorityVote {
    votes: RingBuffer<bool>,
    activation_certainty: f64,
    last_decision: bool,
}

impl MajorityVote {
    pub fn new(size: usize, activation_certainty: f64) -> Result<Self, InferenceError> {
        if !(activation_certainty > 0.0 && activation_certainty <= 1.0) {
            return Err(InferenceError::InvalidParameters(format!(
                "activation certainty must be in (0, 1], got {}",
                activation_certainty
            )));
        }
        let votes = RingBuffer::filled(size, false)
            .map_err(|e| InferenceError::InvalidParameters(e.to_string()))?;

        Ok(Self {
            votes,
            activation_certainty,
            last_decision: false,
        })
    }

    /// Record a prediction and return the smoothed decision
    pub fn push(&mut self, drowsy: bool) -> bool {
        self.votes.push(drowsy);
        self.last_decision = self.vote_fraction() >= self.activation_certainty;
        self.last_decision
    }

    /// Share of drowsy votes in the memory
    pub fn vote_fraction(&self) -> f64 {
        self.votes.count_where(|&vote| vote) as f64 / self.votes.capacity() as f64
    }

    pub fn last_decision(&self) -> bool {
        self.last_decision
    }

    pub fn size(&self) -> usize {
        self.votes.capacity()
    }

    /// Forget every vote
    pub fn reset(&mut self) {
        self.votes.fill(false);
        self.last_decision = false;
    }
}

/// Outcome of one smoothed prediction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedPrediction {
    /// Majority decision after this frame
    pub drowsy: bool,
    /// Share of drowsy votes behind the decision
    pub vote_fraction: f64,
    /// The classifier failed and the previous decision was kept
    pub abstained: bool,
}

/// A classifier whose output passes through a [`MajorityVote`]
pub struct SmoothedClassifier {
    classifier: Box<dyn DrowsinessClassifier>,
    vote: MajorityVote,
}

impl SmoothedClassifier {
    pub fn new(classifier: Box<dyn DrowsinessClassifier>, vote: MajorityVote) -> Self {
        Self { classifier, vote }
    }

    /// Classify a frame and fold the result into the vote
    ///
    /// A failing classifier casts no vote for the frame.
    pub fn predict(&mut self, features: &FeatureVector) -> SmoothedPrediction {
        match self.classifier.predict(features) {
            Ok(drowsy) => {
                let decision = self.vote.push(drowsy);
                debug!(
                    "Frame vote {} -> smoothed {} ({:.2})",
                    drowsy,
                    decision,
                    self.vote.vote_fraction()
                );
                SmoothedPrediction {
                    drowsy: decision,
                    vote_fraction: self.vote.vote_fraction(),
                    abstained: false,
                }
            }
            Err(e) => {
                warn!("Classifier failed, keeping previous decision: {}", e);
                SmoothedPrediction {
                    drowsy: self.vote.last_decision(),
                    vote_fraction: self.vote.vote_fraction(),
                    abstained: true,
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.vote.reset();
    }
}
