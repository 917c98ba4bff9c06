//! Processing-rate measurement

use crate::PipelineError;
use ring_buffer::RingBuffer;
use std::time::Instant;

/// Smoothed frames-per-second over the most recent frame intervals
#[derive(Debug, Clone)]
pub struct FpsMeter {
    rates: RingBuffer<f64>,
    last_tick: Option<Instant>,
}

impl FpsMeter {
    pub fn new(window: usize) -> Result<Self, PipelineError> {
        let rates = RingBuffer::new(window).map_err(|e| PipelineError::Config(e.to_string()))?;
        Ok(Self {
            rates,
            last_tick: None,
        })
    }

    /// Mark a processed frame now
    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    /// Mark a processed frame at `now` and return the smoothed rate
    pub fn tick_at(&mut self, now: Instant) -> f64 {
        if let Some(last) = self.last_tick {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            if elapsed > 0.0 {
                self.rates.push(1.0 / elapsed);
            }
        }
        self.last_tick = Some(now);
        self.fps()
    }

    /// Mean of the stored instantaneous rates, 0 before the second frame
    pub fn fps(&self) -> f64 {
        if self.rates.is_empty() {
            return 0.0;
        }
        self.rates.iter().sum::<f64>() / self.rates.len() as f64
    }
}
