//! Landmark index layout

use serde::{Deserialize, Serialize};

/// Landmark pairs describing one aspect ratio: the vertical openings averaged in
/// the numerator and the horizontal span used as denominator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectPairs {
    pub vertical: Vec<(usize, usize)>,
    pub horizontal: (usize, usize),
}

impl AspectPairs {
    pub fn new(vertical: Vec<(usize, usize)>, horizontal: (usize, usize)) -> Self {
        Self {
            vertical,
            horizontal,
        }
    }

    fn max_index(&self) -> usize {
        self.vertical
            .iter()
            .chain(std::iter::once(&self.horizontal))
            .map(|&(a, b)| a.max(b))
            .max()
            .unwrap_or(0)
    }
}

/// Anatomical landmark indices consumed by the ratio calculators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandmarkLayout {
    pub left_eye: AspectPairs,
    pub right_eye: AspectPairs,
    pub mouth: AspectPairs,
    /// Face-oval reference pairs (upper point, lower point) for head angles
    pub face_oval: Vec<(usize, usize)>,
}

impl LandmarkLayout {
    /// MediaPipe Face Mesh (468 points, 478 with refined irises)
    pub fn mediapipe() -> Self {
        Self {
            left_eye: AspectPairs::new(vec![(385, 380), (387, 373)], (263, 362)),
            right_eye: AspectPairs::new(vec![(160, 144), (158, 153)], (133, 33)),
            mouth: AspectPairs::new(vec![(37, 84), (0, 17), (267, 314)], (62, 29)),
            face_oval: vec![(109, 148), (10, 152)],
        }
    }

    /// Highest landmark index referenced; frames must hold at least this + 1 points
    pub fn max_index(&self) -> usize {
        let oval = self
            .face_oval
            .iter()
            .map(|&(a, b)| a.max(b))
            .max()
            .unwrap_or(0);
        self.left_eye
            .max_index()
            .max(self.right_eye.max_index())
            .max(self.mouth.max_index())
            .max(oval)
    }
}

impl Default for LandmarkLayout {
    fn default() -> Self {
        Self::mediapipe()
    }
}
