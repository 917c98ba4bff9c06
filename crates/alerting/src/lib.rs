//! Alerting System
//!
//! Turns decision records into operator alerts with per-alert cooldown and an
//! hourly throttle, and renders one-line status summaries for display.

mod manager;

pub use manager::{status_line, Alert, AlertConfig, AlertKind, AlertManager, Severity};
