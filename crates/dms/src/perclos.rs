//! PERCLOS (percentage of eyelid closure) over a fixed frame window

use crate::DmsError;
use feature_engine::EyeRatios;
use ring_buffer::RingBuffer;

/// Rolling eye-closure percentage
///
/// The count of closed frames is divided by the full period, not by the number
/// of frames seen so far, so PERCLOS ramps up from zero during warm-up.
#[derive(Debug, Clone)]
pub struct PerclosTracker {
    samples: RingBuffer<EyeRatios>,
    threshold: f64,
    last_value: f64,
}

impl PerclosTracker {
    pub fn new(period: usize, threshold: f64) -> Result<Self, DmsError> {
        let samples = RingBuffer::new(period).map_err(|e| DmsError::Config(e.to_string()))?;
        Ok(Self {
            samples,
            threshold,
            last_value: 0.0,
        })
    }

    /// Record one frame's eye ratios and return the updated PERCLOS
    pub fn push(&mut self, eyes: EyeRatios) -> f64 {
        self.samples.push(eyes);
        let threshold = self.threshold;
        let closed = self.samples.count_where(|e| e.mean() < threshold);
        self.last_value = closed as f64 / self.samples.capacity() as f64;
        self.last_value
    }

    /// Most recent PERCLOS, held across frames without a face
    pub fn value(&self) -> f64 {
        self.last_value
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.last_value = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn eyes(ear: f64) -> EyeRatios {
        EyeRatios { left: ear, right: ear }
    }

    #[test]
    fn test_all_closed_is_one() {
        let mut tracker = PerclosTracker::new(30, 0.3).unwrap();
        for _ in 0..30 {
            tracker.push(eyes(0.1));
        }
        assert!((tracker.value() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_open_is_zero() {
        let mut tracker = PerclosTracker::new(30, 0.3).unwrap();
        for _ in 0..30 {
            tracker.push(eyes(0.35));
        }
        assert_eq!(tracker.value(), 0.0);
    }

    #[test]
    fn test_divides_by_period_during_warm_up() {
        let mut tracker = PerclosTracker::new(10, 0.3).unwrap();
        assert!((tracker.push(eyes(0.1)) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_mean_of_both_eyes_decides() {
        let mut tracker = PerclosTracker::new(2, 0.3).unwrap();
        // One eye shut, the other wide open: mean 0.3 is not below the threshold
        tracker.push(EyeRatios { left: 0.1, right: 0.5 });
        assert_eq!(tracker.value(), 0.0);
    }

    #[test]
    fn test_closed_frames_age_out() {
        let mut tracker = PerclosTracker::new(5, 0.3).unwrap();
        for _ in 0..5 {
            tracker.push(eyes(0.1));
        }
        for _ in 0..5 {
            tracker.push(eyes(0.4));
        }
        assert_eq!(tracker.value(), 0.0);
    }

    #[test]
    fn test_reset() {
        let mut tracker = PerclosTracker::new(5, 0.3).unwrap();
        tracker.push(eyes(0.1));
        tracker.reset();
        assert!(tracker.is_empty());
        assert_eq!(tracker.value(), 0.0);
    }

    proptest! {
        #[test]
        fn test_window_never_exceeds_period(period in 1usize..50, ears in prop::collection::vec(0.0f64..1.0, 0..500)) {
            let mut tracker = PerclosTracker::new(period, 0.3).unwrap();
            for ear in &ears {
                let value = tracker.push(eyes(*ear));
                prop_assert!((0.0..=1.0).contains(&value));
            }
            prop_assert_eq!(tracker.len(), ears.len().min(period));
        }
    }

    #[test]
    fn test_long_stream_keeps_period_samples() {
        let mut tracker = PerclosTracker::new(30, 0.3).unwrap();
        for i in 0..300 {
            tracker.push(eyes(if i % 2 == 0 { 0.1 } else { 0.4 }));
        }
        assert_eq!(tracker.len(), 30);
    }
}
