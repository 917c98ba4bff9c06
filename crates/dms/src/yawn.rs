//! Yawn episode counting

use crate::DmsError;
use ring_buffer::RingBuffer;

/// Counts yawn episodes from the mouth aspect ratio
///
/// A new episode starts only when the ratio crosses the threshold while the
/// recent history holds no yawning frame, so one long yawn counts once.
#[derive(Debug, Clone)]
pub struct YawnDetector {
    history: RingBuffer<bool>,
    threshold: f64,
    episodes: u64,
}

impl YawnDetector {
    pub fn new(history_len: usize, threshold: f64) -> Result<Self, DmsError> {
        let history =
            RingBuffer::filled(history_len, false).map_err(|e| DmsError::Config(e.to_string()))?;
        Ok(Self {
            history,
            threshold,
            episodes: 0,
        })
    }

    /// Feed one frame's MAR, returning whether the operator is yawning
    pub fn update(&mut self, mar: f64) -> bool {
        self.history.push(false);
        if mar < self.threshold {
            return false;
        }

        if self.history.count_where(|&yawning| yawning) == 0 {
            self.episodes += 1;
        }
        if let Some(latest) = self.history.latest_mut() {
            *latest = true;
        }
        true
    }

    /// Advance the history for a frame without a face
    pub fn update_absent(&mut self) {
        self.history.push(false);
    }

    /// Completed yawn episodes since the last reset
    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    pub fn reset(&mut self) {
        self.history.fill(false);
        self.episodes = 0;
    }
}
