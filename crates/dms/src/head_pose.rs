//! Head-angle smoothing

use crate::DmsError;
use feature_engine::HeadAngles;
use ring_buffer::RingBuffer;

/// Moving average of roll and pitch over recent detections
///
/// Both windows start zero-filled, so the first frames after a reset are pulled
/// towards a level head.
#[derive(Debug, Clone)]
pub struct HeadPoseSmoother {
    roll: RingBuffer<f64>,
    pitch: RingBuffer<f64>,
    current: HeadAngles,
}

impl HeadPoseSmoother {
    pub fn new(window: usize) -> Result<Self, DmsError> {
        let filled = || RingBuffer::filled(window, 0.0).map_err(|e| DmsError::Config(e.to_string()));
        Ok(Self {
            roll: filled()?,
            pitch: filled()?,
            current: HeadAngles::default(),
        })
    }

    /// Add one detection and return the smoothed angles
    pub fn push(&mut self, angles: HeadAngles) -> HeadAngles {
        self.roll.push(angles.roll);
        self.pitch.push(angles.pitch);
        self.current = HeadAngles {
            roll: mean(&self.roll),
            pitch: mean(&self.pitch),
        };
        self.current
    }

    /// Last smoothed angles
    pub fn current(&self) -> HeadAngles {
        self.current
    }

    pub fn reset(&mut self) {
        self.roll.fill(0.0);
        self.pitch.fill(0.0);
        self.current = HeadAngles::default();
    }
}

fn mean(window: &RingBuffer<f64>) -> f64 {
    window.iter().sum::<f64>() / window.capacity() as f64
}
