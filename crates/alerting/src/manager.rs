//! Alert Manager Implementation

use dms::{DecisionRecord, DrowsinessState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Consecutive frames without a face before the operator counts as missing
    pub operator_missing_frames: u32,
    /// Stream time that must pass before the same kind fires again
    pub cooldown_seconds: u64,
    /// Alerts allowed per hour of stream time
    pub max_alerts_per_hour: usize,
    /// Raise an informational alert for every new yawn episode
    pub alert_on_yawn: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            operator_missing_frames: 30,
            cooldown_seconds: 10,
            max_alerts_per_hour: 120,
            alert_on_yawn: true,
        }
    }
}

/// What an alert is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Drowsiness,
    OperatorMissing,
    Yawn,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Drowsiness => "drowsiness",
            AlertKind::OperatorMissing => "operator_missing",
            AlertKind::Yawn => "yawn",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            AlertKind::Drowsiness => Severity::Critical,
            AlertKind::OperatorMissing => Severity::Warning,
            AlertKind::Yawn => Severity::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// An alert raised for a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub frame: u64,
    pub timestamp_ms: u64,
    pub message: String,
}

const HOUR_MS: u64 = 3_600_000;

/// Firing history of one alert kind
#[derive(Debug, Clone)]
struct AlertState {
    /// Frame timestamp of the latest firing
    last_fired_ms: u64,
    fire_count: usize,
}

/// Deduplicates and throttles alerts.
///
/// Cooldowns and the hourly budget run on frame timestamps rather than the
/// wall clock, so a recording replayed faster than real time alerts the same
/// way it would have live.
pub struct AlertManager {
    config: AlertConfig,
    states: HashMap<AlertKind, AlertState>,
    hourly_count: usize,
    window_start_ms: Option<u64>,
    missing_frames: u32,
    last_yawn_count: u64,
}

impl AlertManager {
    pub fn new(config: AlertConfig) -> Self {
        info!("Creating alert manager with config: {:?}", config);
        Self {
            config,
            states: HashMap::new(),
            hourly_count: 0,
            window_start_ms: None,
            missing_frames: 0,
            last_yawn_count: 0,
        }
    }

    /// Inspect a decision record and return the alerts that should fire for it
    pub fn evaluate(&mut self, record: &DecisionRecord) -> Vec<Alert> {
        let mut candidates = Vec::new();

        match record.drowsiness {
            DrowsinessState::Drowsy => {
                self.missing_frames = 0;
                candidates.push((
                    AlertKind::Drowsiness,
                    format!("Operator drowsy (PERCLOS {:.0}%)", record.perclos * 100.0),
                ));
            }
            DrowsinessState::NoOperator => {
                self.missing_frames = self.missing_frames.saturating_add(1);
                if self.missing_frames == self.config.operator_missing_frames {
                    candidates.push((
                        AlertKind::OperatorMissing,
                        format!("No operator detected for {} frames", self.missing_frames),
                    ));
                }
            }
            DrowsinessState::Alert => self.missing_frames = 0,
        }

        // Counter drops back after a session reset
        if record.yawn_count < self.last_yawn_count {
            self.last_yawn_count = 0;
        }
        if record.yawn_count > self.last_yawn_count {
            self.last_yawn_count = record.yawn_count;
            if self.config.alert_on_yawn {
                candidates.push((
                    AlertKind::Yawn,
                    format!("Yawn episode {}", record.yawn_count),
                ));
            }
        }

        let mut alerts = Vec::new();
        for (kind, message) in candidates {
            if self.should_fire(kind, record.timestamp_ms) {
                self.record_fire(kind, record.timestamp_ms);
                alerts.push(Alert {
                    kind,
                    severity: kind.severity(),
                    frame: record.frame,
                    timestamp_ms: record.timestamp_ms,
                    message,
                });
            }
        }
        alerts
    }

    /// Whether `kind` may fire at stream time `now_ms`
    pub fn should_fire(&mut self, kind: AlertKind, now_ms: u64) -> bool {
        // A timestamp going backwards means a new session
        let window_expired = match self.window_start_ms {
            Some(start) => now_ms < start || now_ms - start >= HOUR_MS,
            None => true,
        };
        if window_expired {
            self.hourly_count = 0;
            self.window_start_ms = Some(now_ms);
        }

        if self.hourly_count >= self.config.max_alerts_per_hour {
            warn!("Alert throttled: {} alerts this hour", self.hourly_count);
            return false;
        }

        let cooldown_ms = self.config.cooldown_seconds.saturating_mul(1000);
        let cooling = self.states.get(&kind).is_some_and(|state| {
            now_ms
                .checked_sub(state.last_fired_ms)
                .is_some_and(|elapsed| elapsed < cooldown_ms)
        });
        if cooling {
            debug!("Alert {} suppressed during cooldown", kind.as_str());
            return false;
        }

        true
    }

    /// Count a firing of `kind` at stream time `now_ms`
    pub fn record_fire(&mut self, kind: AlertKind, now_ms: u64) {
        self.hourly_count += 1;

        let state = self.states.entry(kind).or_insert(AlertState {
            last_fired_ms: now_ms,
            fire_count: 0,
        });
        state.last_fired_ms = now_ms;
        state.fire_count += 1;

        info!("Alert recorded: {} (count: {})", kind.as_str(), state.fire_count);
    }

    pub fn hourly_count(&self) -> usize {
        self.hourly_count
    }

    /// Forget all history, e.g. between sessions
    pub fn clear(&mut self) {
        self.states.clear();
        self.hourly_count = 0;
        self.window_start_ms = None;
        self.missing_frames = 0;
        self.last_yawn_count = 0;
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

/// One-line operator status for a decision record
pub fn status_line(record: &DecisionRecord) -> String {
    let ratio = |value: Option<f64>| match value {
        Some(v) => format!("{:.3}", v),
        None => "-".to_string(),
    };

    format!(
        "#{:<6} {:>8}ms  {:<11} PERCLOS {:>5.1}%  EAR {:>5}  MAR {:>5}  roll {:>6.1}  pitch {:>6.1}  yawns {}{}  {:.1} fps",
        record.frame,
        record.timestamp_ms,
        record.drowsiness.as_str().to_uppercase(),
        record.perclos * 100.0,
        ratio(record.ear),
        ratio(record.mar),
        record.roll,
        record.pitch,
        record.yawn_count,
        if record.yawning { " (yawning)" } else { "" },
        record.fps,
    )
}
