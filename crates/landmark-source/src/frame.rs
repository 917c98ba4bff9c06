//! Landmark frame types

use serde::{Deserialize, Serialize};

/// A single face landmark in normalized image coordinates.
///
/// `x` and `y` lie in [0, 1]; `z` is relative depth and unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance in the image plane (x, y only)
    pub fn planar_distance(&self, other: &Landmark) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<[f64; 3]> for Landmark {
    fn from(p: [f64; 3]) -> Self {
        Self::new(p[0], p[1], p[2])
    }
}

/// One detected face: landmarks addressed by their stable anatomical index.
///
/// Immutable once built; consumers only borrow it for one frame's processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    points: Vec<Landmark>,
    timestamp_ms: u64,
}

impl LandmarkFrame {
    /// Create a frame from detector output
    pub fn new(points: Vec<Landmark>, timestamp_ms: u64) -> Self {
        Self {
            points,
            timestamp_ms,
        }
    }

    /// Get landmark by index
    pub fn point(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Capture timestamp (milliseconds since stream start)
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }
}

/// Result of asking a source for its next frame
#[derive(Debug, Clone, PartialEq)]
pub enum SourceFrame {
    /// A face was detected
    Face(LandmarkFrame),
    /// The frame was read but no face was detected
    NoFace { timestamp_ms: u64 },
    /// The source has no more frames
    EndOfStream,
}

impl SourceFrame {
    /// Capture timestamp, if this event carries a frame
    pub fn timestamp_ms(&self) -> Option<u64> {
        match self {
            SourceFrame::Face(frame) => Some(frame.timestamp_ms()),
            SourceFrame::NoFace { timestamp_ms } => Some(*timestamp_ms),
            SourceFrame::EndOfStream => None,
        }
    }

    /// Borrow the detected face, if any
    pub fn face(&self) -> Option<&LandmarkFrame> {
        match self {
            SourceFrame::Face(frame) => Some(frame),
            _ => None,
        }
    }
}
