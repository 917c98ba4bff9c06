//! Drowsiness Monitor Runner
//!
//! Command-line wiring for the pipeline: argument parsing, logging setup,
//! classifier selection and a presenter that reports through `tracing`.

use alerting::{status_line, Alert, AlertConfig, Severity};
use anyhow::Context;
use clap::{Parser, ValueEnum};
use dms::{DecisionRecord, DmsModule, DrowsinessConfig, DrowsinessState};
use inference_engine::{DrowsinessClassifier, OnnxClassifier, RuleClassifier};
use landmark_source::JsonLinesSource;
use pipeline::{Pipeline, PipelineSummary, Presenter, StopHandle};
use std::path::PathBuf;
use std::sync::Arc;
use storage::{BatchedSink, SinkConfig};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Threshold preset the configuration starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Preset {
    #[default]
    Default,
    Strict,
    Lenient,
}

impl Preset {
    pub fn config(&self) -> DrowsinessConfig {
        match self {
            Preset::Default => DrowsinessConfig::default(),
            Preset::Strict => DrowsinessConfig::strict(),
            Preset::Lenient => DrowsinessConfig::lenient(),
        }
    }
}

/// Replay a facial-landmark recording and record drowsiness decisions
#[derive(Parser, Debug)]
#[command(name = "drowsiness-monitor", author, version, about, long_about = None)]
pub struct Args {
    /// JSON-lines landmark recording, one frame per line
    #[arg(long, value_name = "FILE")]
    pub input: PathBuf,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Threshold preset applied before the configuration file
    #[arg(long, value_enum, default_value_t = Preset::Default)]
    pub preset: Preset,

    /// ONNX drowsiness classifier, overrides the configured model
    #[arg(long, value_name = "FILE")]
    pub model: Option<PathBuf>,

    /// Directory for the results file
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Results file stem; a numeric suffix is added if the file exists
    #[arg(long, value_name = "NAME")]
    pub output_name: Option<String>,

    /// Frame rate used to stamp frames recorded without timestamps
    #[arg(long, default_value = "30.0", value_name = "FPS")]
    pub fps: f64,

    /// Log a status line every N frames (0 disables)
    #[arg(long, default_value = "30", value_name = "FRAMES")]
    pub status_every: u64,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Initialize logging
pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Resolve the effective configuration from preset, file, environment and flags
pub fn resolve_config(args: &Args) -> anyhow::Result<DrowsinessConfig> {
    let mut config = DrowsinessConfig::load_with_base(&args.preset.config(), args.config.as_deref())
        .context("Failed to load configuration")?;

    if let Some(model) = &args.model {
        config.model_path = Some(model.display().to_string());
    }
    if let Some(dir) = &args.output_dir {
        config.output_directory = dir.display().to_string();
    }
    if let Some(name) = &args.output_name {
        config.output_name = name.clone();
    }
    Ok(config)
}

/// The configured ONNX model, or the rule-based classifier without one
pub fn build_classifier(config: &DrowsinessConfig) -> anyhow::Result<Box<dyn DrowsinessClassifier>> {
    match &config.model_path {
        Some(path) => {
            let classifier = OnnxClassifier::load(path)
                .with_context(|| format!("Failed to load classifier {}", path))?;
            Ok(Box::new(classifier))
        }
        None => {
            info!("No model configured, using rule-based classifier");
            Ok(Box::new(RuleClassifier::new()))
        }
    }
}

/// Alerting tuned to the recording: the operator counts as missing after
/// about one second without a face
pub fn alert_config(args: &Args) -> AlertConfig {
    AlertConfig {
        operator_missing_frames: (args.fps.round() as u32).max(1),
        ..Default::default()
    }
}

/// Reports decisions, alerts and status messages through the log
pub struct LogPresenter {
    status_every: u64,
    last_state: Option<DrowsinessState>,
}

impl LogPresenter {
    pub fn new(status_every: u64) -> Self {
        Self {
            status_every,
            last_state: None,
        }
    }
}

impl Presenter for LogPresenter {
    fn on_record(&mut self, record: &DecisionRecord) {
        let changed = self.last_state != Some(record.drowsiness);
        let periodic = self.status_every > 0 && record.frame % self.status_every == 0;
        if changed || periodic {
            info!("{}", status_line(record));
        }
        self.last_state = Some(record.drowsiness);
    }

    fn on_alert(&mut self, alert: &Alert) {
        match alert.severity {
            Severity::Critical => error!("ALERT frame {}: {}", alert.frame, alert.message),
            Severity::Warning => warn!("ALERT frame {}: {}", alert.frame, alert.message),
            Severity::Info => info!("frame {}: {}", alert.frame, alert.message),
        }
    }

    fn on_status(&mut self, message: &str) {
        warn!("{}", message);
    }
}

/// Replay the recording through the full pipeline until it ends or `stop` fires
pub async fn run(
    args: &Args,
    config: DrowsinessConfig,
    stop: StopHandle,
) -> anyhow::Result<PipelineSummary> {
    let source = JsonLinesSource::open(&args.input, args.fps)
        .with_context(|| format!("Failed to open recording {}", args.input.display()))?;

    let classifier = build_classifier(&config)?;
    let dms = DmsModule::new(config.clone(), classifier).context("Failed to create analyzer")?;

    let sink = Arc::new(
        BatchedSink::create(SinkConfig {
            directory: PathBuf::from(&config.output_directory),
            name: config.output_name.clone(),
            batch_size: config.batch_size,
            auto_flush_interval: config.auto_flush_interval(),
            ..Default::default()
        })
        .context("Failed to create results file")?,
    );

    let pipeline = Pipeline::new(&config)?
        .with_alert_config(alert_config(args))
        .with_stop_handle(stop);
    let summary = pipeline
        .run(source, dms, sink, LogPresenter::new(args.status_every))
        .await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use feature_engine::synthetic::SyntheticFace;
    use feature_engine::LandmarkLayout;
    use std::io::Write;
    use tempfile::TempDir;

    fn args(input: PathBuf, output: &TempDir) -> Args {
        Args::parse_from([
            "drowsiness-monitor",
            "--input",
            input.to_str().unwrap(),
            "--output-dir",
            output.path().to_str().unwrap(),
            "--output-name",
            "session",
        ])
    }

    fn recording(dir: &TempDir, frames: usize) -> PathBuf {
        let path = dir.path().join("recording.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        let layout = LandmarkLayout::mediapipe();
        for i in 0..frames {
            if i % 10 == 5 {
                writeln!(file, "{{\"landmarks\": null}}").unwrap();
                continue;
            }
            let face = SyntheticFace::new().build(&layout, 0);
            let points: Vec<[f64; 3]> = face.points().iter().map(|p| [p.x, p.y, p.z]).collect();
            writeln!(
                file,
                "{}",
                serde_json::json!({ "timestamp_ms": i * 33, "landmarks": points })
            )
            .unwrap();
        }
        path
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["drowsiness-monitor", "--input", "frames.jsonl"]);
        assert_eq!(args.preset, Preset::Default);
        assert_eq!(args.fps, 30.0);
        assert!(args.model.is_none());
        assert!(!args.verbose);
    }

    #[test]
    fn test_flags_override_config() {
        let dir = TempDir::new().unwrap();
        let mut args = args(PathBuf::from("frames.jsonl"), &dir);
        args.preset = Preset::Strict;
        args.model = Some(PathBuf::from("model.onnx"));

        let config = resolve_config(&args).unwrap();
        assert_eq!(config.model_path.as_deref(), Some("model.onnx"));
        assert_eq!(config.output_name, "session");
        assert_eq!(config.high_perclos_threshold, 0.2);
    }

    #[test]
    fn test_operator_missing_after_one_second() {
        let mut args = Args::parse_from(["drowsiness-monitor", "--input", "frames.jsonl"]);
        assert_eq!(alert_config(&args).operator_missing_frames, 30);

        args.fps = 12.5;
        assert_eq!(alert_config(&args).operator_missing_frames, 13);
        args.fps = 0.2;
        assert_eq!(alert_config(&args).operator_missing_frames, 1);
    }

    #[test]
    fn test_missing_model_is_an_error() {
        let config = DrowsinessConfig {
            model_path: Some("/nonexistent/model.onnx".to_string()),
            ..Default::default()
        };
        assert!(build_classifier(&config).is_err());
        assert!(build_classifier(&DrowsinessConfig::default()).is_ok());
    }

    #[test]
    fn test_log_presenter_tracks_state() {
        let mut presenter = LogPresenter::new(0);
        let record = DecisionRecord {
            frame: 3,
            timestamp_ms: 99,
            mar: None,
            ear: None,
            perclos: 0.0,
            roll: 0.0,
            pitch: 0.0,
            yawning: false,
            yawn_count: 0,
            drowsiness: DrowsinessState::NoOperator,
            fps: 30.0,
        };
        presenter.on_record(&record);
        assert_eq!(presenter.last_state, Some(DrowsinessState::NoOperator));
    }

    #[tokio::test]
    async fn test_replay_writes_results() {
        let dir = TempDir::new().unwrap();
        let input = recording(&dir, 40);
        let args = args(input, &dir);
        let config = resolve_config(&args).unwrap();

        let summary = run(&args, config, StopHandle::default()).await.unwrap();
        assert_eq!(summary.frames_processed, 40);
        assert_eq!(summary.records_persisted, 40);
        assert_eq!(summary.output_path, dir.path().join("session.csv"));

        let contents = std::fs::read_to_string(&summary.output_path).unwrap();
        assert_eq!(contents.lines().count(), 41);
        assert_eq!(contents.matches("no_operator").count(), 4);
    }

    #[tokio::test]
    async fn test_missing_recording_fails() {
        let dir = TempDir::new().unwrap();
        let args = args(dir.path().join("absent.jsonl"), &dir);
        let config = resolve_config(&args).unwrap();
        assert!(run(&args, config, StopHandle::default()).await.is_err());
    }
}
