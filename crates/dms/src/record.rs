//! Per-frame analysis results and decision records

use crate::decision::DecisionTier;
use feature_engine::RatioSample;
use serde::{Deserialize, Serialize};
use std::fmt;
use storage::DelimitedRecord;

/// Operator state reported for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrowsinessState {
    #[default]
    Alert,
    Drowsy,
    /// No usable face in the frame
    NoOperator,
}

impl DrowsinessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrowsinessState::Alert => "alert",
            DrowsinessState::Drowsy => "drowsy",
            DrowsinessState::NoOperator => "no_operator",
        }
    }
}

impl fmt::Display for DrowsinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the analyzer concluded about one frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameAnalysis {
    /// Raw ratios, absent when no face was usable
    pub ratios: Option<RatioSample>,
    pub perclos: f64,
    pub yawning: bool,
    /// Yawn episodes so far
    pub yawn_count: u64,
    /// Smoothed roll, 0 without a face
    pub roll: f64,
    /// Smoothed pitch, 0 without a face
    pub pitch: f64,
    pub state: DrowsinessState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<DecisionTier>,
    /// The classifier failed on this frame
    pub classifier_abstained: bool,
}

impl FrameAnalysis {
    pub fn face_detected(&self) -> bool {
        self.ratios.is_some()
    }
}

/// Everything recorded about one processed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Zero-based frame sequence number
    pub frame: u64,
    pub timestamp_ms: u64,
    pub mar: Option<f64>,
    pub ear: Option<f64>,
    pub perclos: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yawning: bool,
    pub yawn_count: u64,
    pub drowsiness: DrowsinessState,
    /// Measured processing rate
    pub fps: f64,
}

impl DecisionRecord {
    pub fn new(frame: u64, timestamp_ms: u64, analysis: &FrameAnalysis, fps: f64) -> Self {
        Self {
            frame,
            timestamp_ms,
            mar: analysis.ratios.map(|r| r.mar),
            ear: analysis.ratios.map(|r| r.ear),
            perclos: analysis.perclos,
            roll: analysis.roll,
            pitch: analysis.pitch,
            yawning: analysis.yawning,
            yawn_count: analysis.yawn_count,
            drowsiness: analysis.state,
            fps,
        }
    }
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl DelimitedRecord for DecisionRecord {
    fn header() -> &'static [&'static str] {
        &[
            "frame",
            "timestamp",
            "mar",
            "ear",
            "perclos",
            "roll",
            "pitch",
            "yawning",
            "yawn_count",
            "drowsiness",
            "fps",
        ]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.frame.to_string(),
            self.timestamp_ms.to_string(),
            optional(self.mar),
            optional(self.ear),
            self.perclos.to_string(),
            self.roll.to_string(),
            self.pitch.to_string(),
            self.yawning.to_string(),
            self.yawn_count.to_string(),
            self.drowsiness.as_str().to_string(),
            format!("{:.2}", self.fps),
        ]
    }
}
