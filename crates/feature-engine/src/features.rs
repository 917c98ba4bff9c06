//! Ratio calculators

use crate::layout::{AspectPairs, LandmarkLayout};
use crate::FeatureError;
use landmark_source::{Landmark, LandmarkFrame};
use serde::{Deserialize, Serialize};

/// Horizontal spans at or below this are treated as degenerate
const MIN_SPAN: f64 = 1e-9;

/// A stateless metric computed from one frame's landmarks
pub trait FaceMetric {
    type Output;

    fn compute(&self, frame: &LandmarkFrame) -> Result<Self::Output, FeatureError>;
}

fn landmark(frame: &LandmarkFrame, index: usize) -> Result<&Landmark, FeatureError> {
    frame.point(index).ok_or(FeatureError::MissingLandmark {
        index,
        available: frame.len(),
    })
}

fn pair_distance(frame: &LandmarkFrame, (a, b): (usize, usize)) -> Result<f64, FeatureError> {
    Ok(landmark(frame, a)?.planar_distance(landmark(frame, b)?))
}

/// Mean vertical opening divided by horizontal span
fn aspect_ratio(frame: &LandmarkFrame, pairs: &AspectPairs) -> Result<f64, FeatureError> {
    if pairs.vertical.is_empty() {
        return Err(FeatureError::Degenerate("no vertical landmark pairs"));
    }

    let mut total = 0.0;
    for &pair in &pairs.vertical {
        total += pair_distance(frame, pair)?;
    }
    let mean_vertical = total / pairs.vertical.len() as f64;

    let horizontal = pair_distance(frame, pairs.horizontal)?;
    if horizontal <= MIN_SPAN {
        return Err(FeatureError::Degenerate("zero horizontal span"));
    }

    Ok(mean_vertical / horizontal)
}

/// Per-eye aspect ratios
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EyeRatios {
    pub left: f64,
    pub right: f64,
}

impl EyeRatios {
    /// Reported EAR: arithmetic mean of both eyes
    pub fn mean(&self) -> f64 {
        (self.left + self.right) / 2.0
    }
}

/// Eye aspect ratio (EAR), clamped to [0, 1] per eye
#[derive(Debug, Clone)]
pub struct EyeClosure {
    left: AspectPairs,
    right: AspectPairs,
}

impl EyeClosure {
    pub fn new(left: AspectPairs, right: AspectPairs) -> Self {
        Self { left, right }
    }
}

impl FaceMetric for EyeClosure {
    type Output = EyeRatios;

    fn compute(&self, frame: &LandmarkFrame) -> Result<EyeRatios, FeatureError> {
        Ok(EyeRatios {
            left: aspect_ratio(frame, &self.left)?.clamp(0.0, 1.0),
            right: aspect_ratio(frame, &self.right)?.clamp(0.0, 1.0),
        })
    }
}

/// Mouth aspect ratio (MAR). Not clamped: wide yawns exceed 1.
#[derive(Debug, Clone)]
pub struct MouthAspect {
    mouth: AspectPairs,
}

impl MouthAspect {
    pub fn new(mouth: AspectPairs) -> Self {
        Self { mouth }
    }
}

impl FaceMetric for MouthAspect {
    type Output = f64;

    fn compute(&self, frame: &LandmarkFrame) -> Result<f64, FeatureError> {
        aspect_ratio(frame, &self.mouth)
    }
}

/// Head roll and pitch in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeadAngles {
    pub roll: f64,
    pub pitch: f64,
}

/// Head tilt from face-oval reference pairs
#[derive(Debug, Clone)]
pub struct HeadAngle {
    reference_pairs: Vec<(usize, usize)>,
}

impl HeadAngle {
    pub fn new(reference_pairs: Vec<(usize, usize)>) -> Self {
        Self { reference_pairs }
    }

    /// Euler angles for one (upper, lower) landmark pair.
    ///
    /// `atan2` is total, so coincident points give finite angles.
    pub fn pair_angles(upper: &Landmark, lower: &Landmark) -> HeadAngles {
        let dx = upper.x - lower.x;
        let dy = upper.y - lower.y;
        let dz = upper.z - lower.z;

        HeadAngles {
            roll: dz.abs().atan2(dx).to_degrees() - 90.0,
            pitch: dz.atan2(dy.abs()).to_degrees(),
        }
    }
}

impl FaceMetric for HeadAngle {
    type Output = HeadAngles;

    fn compute(&self, frame: &LandmarkFrame) -> Result<HeadAngles, FeatureError> {
        if self.reference_pairs.is_empty() {
            return Err(FeatureError::Degenerate("no face-oval reference pairs"));
        }

        let mut sum = HeadAngles::default();
        for &(upper, lower) in &self.reference_pairs {
            let angles = Self::pair_angles(landmark(frame, upper)?, landmark(frame, lower)?);
            sum.roll += angles.roll;
            sum.pitch += angles.pitch;
        }

        let n = self.reference_pairs.len() as f64;
        Ok(HeadAngles {
            roll: sum.roll / n,
            pitch: sum.pitch / n,
        })
    }
}

/// All ratios derived from one frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RatioSample {
    pub eyes: EyeRatios,
    /// Mean EAR of both eyes
    pub ear: f64,
    pub mar: f64,
    pub roll: f64,
    pub pitch: f64,
}

/// Runs every ratio calculator over a frame
#[derive(Debug, Clone)]
pub struct RatioExtractor {
    eyes: EyeClosure,
    mouth: MouthAspect,
    head: HeadAngle,
}

impl RatioExtractor {
    pub fn new(layout: &LandmarkLayout) -> Self {
        Self {
            eyes: EyeClosure::new(layout.left_eye.clone(), layout.right_eye.clone()),
            mouth: MouthAspect::new(layout.mouth.clone()),
            head: HeadAngle::new(layout.face_oval.clone()),
        }
    }

    /// Extract the ratio sample for one detected face
    pub fn extract(&self, frame: &LandmarkFrame) -> Result<RatioSample, FeatureError> {
        let eyes = self.eyes.compute(frame)?;
        let mar = self.mouth.compute(frame)?;
        let head = self.head.compute(frame)?;

        Ok(RatioSample {
            eyes,
            ear: eyes.mean(),
            mar,
            roll: head.roll,
            pitch: head.pitch,
        })
    }
}

impl Default for RatioExtractor {
    fn default() -> Self {
        Self::new(&LandmarkLayout::default())
    }
}
