//! Driver Monitoring System (DMS)
//!
//! Turns per-frame landmark ratios into a drowsiness verdict:
//! - PERCLOS over a fixed frame window
//! - Yawn episode counting
//! - Smoothed head roll and pitch
//! - Tiered decision with a majority-voted classifier in the ambiguous band

pub mod config;
pub mod decision;
pub mod head_pose;
pub mod perclos;
pub mod record;
pub mod yawn;

pub use config::DrowsinessConfig;
pub use decision::{Decision, DecisionEngine, DecisionTier};
pub use head_pose::HeadPoseSmoother;
pub use perclos::PerclosTracker;
pub use record::{DecisionRecord, DrowsinessState, FrameAnalysis};
pub use yawn::YawnDetector;

use feature_engine::{HeadAngles, LandmarkLayout, RatioExtractor};
use inference_engine::{DrowsinessClassifier, FeatureVector, MajorityVote, SmoothedClassifier};
use landmark_source::LandmarkFrame;
use thiserror::Error;
use tracing::{debug, info};

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Inference setup failed: {0}")]
    Inference(#[from] inference_engine::InferenceError),
}

/// Driver monitoring module
///
/// Owns every rolling aggregator. Frames must be fed in capture order.
pub struct DmsModule {
    config: DrowsinessConfig,
    extractor: RatioExtractor,
    perclos: PerclosTracker,
    yawn: YawnDetector,
    head_pose: HeadPoseSmoother,
    decision: DecisionEngine,
}

impl DmsModule {
    /// Create a new DMS module with the default MediaPipe landmark layout
    pub fn new(
        config: DrowsinessConfig,
        classifier: Box<dyn DrowsinessClassifier>,
    ) -> Result<Self, DmsError> {
        Self::with_layout(config, LandmarkLayout::mediapipe(), classifier)
    }

    pub fn with_layout(
        config: DrowsinessConfig,
        layout: LandmarkLayout,
        classifier: Box<dyn DrowsinessClassifier>,
    ) -> Result<Self, DmsError> {
        config.validate()?;
        info!(
            "Creating DMS module with PERCLOS period {} and tiers {}..{}",
            config.perclos_period, config.low_perclos_threshold, config.high_perclos_threshold
        );

        let vote = MajorityVote::new(config.prediction_memory_size, config.activation_certainty)?;
        Ok(Self {
            extractor: RatioExtractor::new(&layout),
            perclos: PerclosTracker::new(config.perclos_period, config.perclos_threshold)?,
            yawn: YawnDetector::new(config.yawn_history_len, config.yawn_threshold)?,
            head_pose: HeadPoseSmoother::new(config.head_angle_window)?,
            decision: DecisionEngine::new(
                config.high_perclos_threshold,
                config.low_perclos_threshold,
                SmoothedClassifier::new(classifier, vote),
            ),
            config,
        })
    }

    /// Analyze one frame. `None` means the detector found no face.
    ///
    /// A frame whose ratios cannot be computed is handled exactly like a
    /// missing face.
    pub fn analyze(&mut self, frame: Option<&LandmarkFrame>) -> FrameAnalysis {
        let sample = frame.and_then(|frame| match self.extractor.extract(frame) {
            Ok(sample) => Some(sample),
            Err(e) => {
                debug!("Unusable landmark frame at {}ms: {}", frame.timestamp_ms(), e);
                None
            }
        });

        let Some(sample) = sample else {
            self.yawn.update_absent();
            return FrameAnalysis {
                ratios: None,
                perclos: self.perclos.value(),
                yawning: false,
                yawn_count: self.yawn.episodes(),
                roll: 0.0,
                pitch: 0.0,
                state: DrowsinessState::NoOperator,
                tier: None,
                classifier_abstained: false,
            };
        };

        let perclos = self.perclos.push(sample.eyes);
        let yawning = self.yawn.update(sample.mar);
        let angles = self.head_pose.push(HeadAngles {
            roll: sample.roll,
            pitch: sample.pitch,
        });

        let features = FeatureVector::new(sample.mar, sample.ear, angles.roll, angles.pitch);
        let decision = self.decision.decide(perclos, &features);

        FrameAnalysis {
            ratios: Some(sample),
            perclos,
            yawning,
            yawn_count: self.yawn.episodes(),
            roll: angles.roll,
            pitch: angles.pitch,
            state: if decision.drowsy {
                DrowsinessState::Drowsy
            } else {
                DrowsinessState::Alert
            },
            tier: Some(decision.tier),
            classifier_abstained: decision.abstained,
        }
    }

    /// Reset every aggregator and the prediction memory (new session or driver)
    pub fn reset_state(&mut self) {
        info!("Resetting driver state");
        self.perclos.reset();
        self.yawn.reset();
        self.head_pose.reset();
        self.decision.reset();
    }

    pub fn config(&self) -> &DrowsinessConfig {
        &self.config
    }
}
