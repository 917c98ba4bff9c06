//! DMS configuration

use crate::DmsError;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

const DEFAULT_AUTO_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Prefix of environment overrides, e.g. `DROWSINESS_YAWN_THRESHOLD=0.6`
pub const ENV_PREFIX: &str = "DROWSINESS";

/// Drowsiness monitor configuration
///
/// Built once at startup and handed to every component by value or reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrowsinessConfig {
    /// Mean EAR below which a frame counts as eyes closed
    pub perclos_threshold: f64,

    /// Number of frames in the PERCLOS window
    pub perclos_period: usize,

    /// PERCLOS at or above which the operator is drowsy outright
    pub high_perclos_threshold: f64,

    /// PERCLOS at or above which the classifier is consulted
    pub low_perclos_threshold: f64,

    /// MAR at or above which the mouth counts as yawning
    pub yawn_threshold: f64,

    /// Frames of yawn history used to detect a new episode
    pub yawn_history_len: usize,

    /// Frames averaged by the head-angle smoother
    pub head_angle_window: usize,

    /// Share of drowsy votes needed to report drowsy
    pub activation_certainty: f64,

    /// Number of classifier predictions remembered for voting
    pub prediction_memory_size: usize,

    /// Records buffered before a write
    pub batch_size: usize,

    /// Maximum age of buffered records in seconds, fractions allowed
    pub auto_flush_interval_seconds: f64,

    /// Frame intervals averaged by the FPS meter
    pub fps_window: usize,

    /// Events kept for slow presentation consumers
    pub presentation_queue_capacity: usize,

    /// Records in flight to the persistence writer
    pub persistence_queue_capacity: usize,

    /// ONNX classifier; the rule-based classifier is used when unset
    pub model_path: Option<String>,

    /// Directory for result files
    pub output_directory: String,

    /// Result file stem
    pub output_name: String,
}

impl Default for DrowsinessConfig {
    fn default() -> Self {
        Self {
            perclos_threshold: 0.3,
            perclos_period: 900,
            high_perclos_threshold: 0.25,
            low_perclos_threshold: 0.125,
            yawn_threshold: 0.5,
            yawn_history_len: 10,
            head_angle_window: 15,
            activation_certainty: 0.5,
            prediction_memory_size: 60,
            batch_size: 100,
            auto_flush_interval_seconds: 30.0,
            fps_window: 15,
            presentation_queue_capacity: 64,
            persistence_queue_capacity: 256,
            model_path: None,
            output_directory: "results".to_string(),
            output_name: "results".to_string(),
        }
    }
}

impl DrowsinessConfig {
    /// Create strict config (reacts earlier)
    pub fn strict() -> Self {
        Self {
            high_perclos_threshold: 0.2,
            low_perclos_threshold: 0.1,
            yawn_threshold: 0.45,
            activation_certainty: 0.4,
            ..Default::default()
        }
    }

    /// Create lenient config (fewer false alarms)
    pub fn lenient() -> Self {
        Self {
            high_perclos_threshold: 0.3,
            low_perclos_threshold: 0.15,
            yawn_threshold: 0.6,
            activation_certainty: 0.6,
            ..Default::default()
        }
    }

    /// Layer defaults, an optional file and `DROWSINESS_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, DmsError> {
        Self::load_with_base(&Self::default(), path)
    }

    /// Like [`DrowsinessConfig::load`], starting from a preset instead of the defaults
    pub fn load_with_base(base: &Self, path: Option<&Path>) -> Result<Self, DmsError> {
        let defaults = Config::try_from(base).map_err(|e| DmsError::Config(e.to_string()))?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| DmsError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> Result<(), DmsError> {
        let unit = |name: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(DmsError::Config(format!("{} must be within [0, 1], got {}", name, value)))
            }
        };
        unit("high_perclos_threshold", self.high_perclos_threshold)?;
        unit("low_perclos_threshold", self.low_perclos_threshold)?;

        if self.low_perclos_threshold > self.high_perclos_threshold {
            return Err(DmsError::Config(format!(
                "low_perclos_threshold {} exceeds high_perclos_threshold {}",
                self.low_perclos_threshold, self.high_perclos_threshold
            )));
        }
        if !(self.activation_certainty > 0.0 && self.activation_certainty <= 1.0) {
            return Err(DmsError::Config(format!(
                "activation_certainty must be within (0, 1], got {}",
                self.activation_certainty
            )));
        }
        if !(self.perclos_threshold > 0.0) || !(self.yawn_threshold > 0.0) {
            return Err(DmsError::Config("ratio thresholds must be positive".to_string()));
        }
        let interval = self.auto_flush_interval_seconds;
        if !(interval.is_finite() && interval > 0.0)
            || Duration::try_from_secs_f64(interval).is_err()
        {
            return Err(DmsError::Config(format!(
                "auto_flush_interval_seconds must be a positive number of seconds, got {}",
                interval
            )));
        }

        let sizes = [
            ("perclos_period", self.perclos_period),
            ("yawn_history_len", self.yawn_history_len),
            ("head_angle_window", self.head_angle_window),
            ("prediction_memory_size", self.prediction_memory_size),
            ("batch_size", self.batch_size),
            ("fps_window", self.fps_window),
            ("presentation_queue_capacity", self.presentation_queue_capacity),
            ("persistence_queue_capacity", self.persistence_queue_capacity),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(DmsError::Config(format!("{} must be greater than zero", name)));
            }
        }
        Ok(())
    }

    /// Flush interval as a duration; unvalidated nonsense falls back to the default
    pub fn auto_flush_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.auto_flush_interval_seconds)
            .ok()
            .filter(|interval| !interval.is_zero())
            .unwrap_or(DEFAULT_AUTO_FLUSH_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = DrowsinessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.perclos_period, 900);
        assert_eq!(config.prediction_memory_size, 60);
        assert_eq!(config.auto_flush_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(DrowsinessConfig::strict().validate().is_ok());
        assert!(DrowsinessConfig::lenient().validate().is_ok());
        assert!(
            DrowsinessConfig::strict().high_perclos_threshold
                < DrowsinessConfig::lenient().high_perclos_threshold
        );
    }

    #[test]
    fn test_inverted_tiers_rejected() {
        let config = DrowsinessConfig {
            low_perclos_threshold: 0.3,
            high_perclos_threshold: 0.2,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DmsError::Config(_))));
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = DrowsinessConfig {
            yawn_history_len: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "perclos_period = 30").unwrap();
        writeln!(file, "perclos_threshold = 0.4").unwrap();
        writeln!(file, "model_path = \"drowsiness.onnx\"").unwrap();

        let config = DrowsinessConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.perclos_period, 30);
        assert_eq!(config.perclos_threshold, 0.4);
        assert_eq!(config.model_path.as_deref(), Some("drowsiness.onnx"));
        assert_eq!(config.yawn_history_len, 10);
    }

    #[test]
    fn test_load_keeps_preset_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "batch_size = 10").unwrap();

        let config =
            DrowsinessConfig::load_with_base(&DrowsinessConfig::strict(), Some(file.path())).unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.high_perclos_threshold, 0.2);
    }

    #[test]
    fn test_fractional_flush_interval_is_kept() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "auto_flush_interval_seconds = 0.5").unwrap();

        let config = DrowsinessConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.auto_flush_interval_seconds, 0.5);
        assert_eq!(config.auto_flush_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_whole_flush_interval_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "auto_flush_interval_seconds = 2").unwrap();

        let config = DrowsinessConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.auto_flush_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_non_positive_flush_interval_rejected() {
        for interval in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = DrowsinessConfig {
                auto_flush_interval_seconds: interval,
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(DmsError::Config(_))),
                "accepted interval {}",
                interval
            );
        }
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "batch_size = 0").unwrap();
        assert!(DrowsinessConfig::load(Some(file.path())).is_err());
    }
}
