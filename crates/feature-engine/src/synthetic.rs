//! Synthetic faces
//!
//! Builds landmark frames with exact, known ratios. Used by tests and demos that
//! need a face without a landmark detector.

use crate::layout::{AspectPairs, LandmarkLayout};
use landmark_source::{Landmark, LandmarkFrame};

/// Horizontal span given to every synthetic eye and mouth
const SPAN: f64 = 0.1;

/// Builder for a face whose EAR, MAR and head angles are chosen up front
#[derive(Debug, Clone, Copy)]
pub struct SyntheticFace {
    eye_openness: f64,
    mouth_openness: f64,
    roll_degrees: f64,
    pitch_degrees: f64,
}

impl Default for SyntheticFace {
    fn default() -> Self {
        Self {
            eye_openness: 0.3,
            mouth_openness: 0.1,
            roll_degrees: 0.0,
            // A zero pitch puts both oval points at equal depth, which reads as roll -90
            pitch_degrees: 5.0,
        }
    }
}

impl SyntheticFace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target EAR for both eyes
    pub fn eye_openness(mut self, ratio: f64) -> Self {
        self.eye_openness = ratio;
        self
    }

    /// Target MAR
    pub fn mouth_openness(mut self, ratio: f64) -> Self {
        self.mouth_openness = ratio;
        self
    }

    pub fn roll_degrees(mut self, degrees: f64) -> Self {
        self.roll_degrees = degrees;
        self
    }

    pub fn pitch_degrees(mut self, degrees: f64) -> Self {
        self.pitch_degrees = degrees;
        self
    }

    /// Place every landmark the layout references
    pub fn build(&self, layout: &LandmarkLayout, timestamp_ms: u64) -> LandmarkFrame {
        let mut points = vec![Landmark::new(0.5, 0.5, 0.0); layout.max_index() + 1];

        place_aspect(&mut points, &layout.left_eye, (0.62, 0.40), self.eye_openness);
        place_aspect(&mut points, &layout.right_eye, (0.38, 0.40), self.eye_openness);
        place_aspect(&mut points, &layout.mouth, (0.50, 0.75), self.mouth_openness);

        let (upper_y, lower_y): (f64, f64) = (0.15, 0.90);
        let dz = (upper_y - lower_y).abs() * self.pitch_degrees.to_radians().tan();
        let dx = -dz.abs() * self.roll_degrees.to_radians().tan();
        for &(upper, lower) in &layout.face_oval {
            points[upper] = Landmark::new(0.5 + dx / 2.0, upper_y, dz);
            points[lower] = Landmark::new(0.5 - dx / 2.0, lower_y, 0.0);
        }

        LandmarkFrame::new(points, timestamp_ms)
    }
}

fn place_aspect(points: &mut [Landmark], pairs: &AspectPairs, (cx, cy): (f64, f64), ratio: f64) {
    let (left, right) = pairs.horizontal;
    points[left] = Landmark::new(cx - SPAN / 2.0, cy, 0.0);
    points[right] = Landmark::new(cx + SPAN / 2.0, cy, 0.0);

    let half_opening = ratio * SPAN / 2.0;
    let count = pairs.vertical.len().max(1) as f64;
    for (i, &(top, bottom)) in pairs.vertical.iter().enumerate() {
        // Spread the vertical pairs across the middle of the span
        let x = cx - SPAN / 4.0 + (i as f64 + 0.5) * (SPAN / 2.0) / count;
        points[top] = Landmark::new(x, cy - half_opening, 0.0);
        points[bottom] = Landmark::new(x, cy + half_opening, 0.0);
    }
}
