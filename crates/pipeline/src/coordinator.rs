//! Pipeline Coordinator
//!
//! Lifecycle is `Idle -> Running -> Draining -> Stopped`. The frame loop stops on
//! a stop request, at end of stream, or when the source fails. Draining waits for
//! the persistence writer to empty its queue and then forces a final flush, so
//! every processed frame is on disk once the pipeline reports `Stopped`.

use crate::fps::FpsMeter;
use crate::presenter::{spawn_presentation, PresentationEvent, Presenter};
use crate::PipelineError;
use alerting::{AlertConfig, AlertManager};
use dms::{DecisionRecord, DmsModule, DrowsinessConfig};
use landmark_source::{LandmarkSource, SourceFrame};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storage::{spawn_auto_flush, BatchedSink};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

/// Upper bound on how long a stale batch can wait for the auto-flush task
const MAX_FLUSH_POLL: Duration = Duration::from_secs(1);

/// Pipeline lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// Why the frame loop ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EndReason {
    StopRequested,
    EndOfStream,
    SourceFailed(String),
    /// The persistence writer went away before the stream ended
    PersistenceClosed,
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub frames_processed: u64,
    /// Rows written to the output file, including the final flush
    pub records_persisted: u64,
    pub end_reason: EndReason,
    pub output_path: PathBuf,
}

/// Cooperative stop flag, checked once per frame
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Drives one run from a source to the presentation and persistence sinks
pub struct Pipeline {
    fps_window: usize,
    presentation_capacity: usize,
    persistence_capacity: usize,
    flush_poll_interval: Duration,
    alert_config: AlertConfig,
    stop: StopHandle,
    state: watch::Sender<PipelineState>,
}

impl Pipeline {
    pub fn new(config: &DrowsinessConfig) -> Result<Self, PipelineError> {
        config
            .validate()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        info!(
            "Creating pipeline with presentation queue {} and persistence queue {}",
            config.presentation_queue_capacity, config.persistence_queue_capacity
        );

        let (state, _) = watch::channel(PipelineState::Idle);
        Ok(Self {
            fps_window: config.fps_window,
            presentation_capacity: config.presentation_queue_capacity,
            persistence_capacity: config.persistence_queue_capacity,
            flush_poll_interval: config.auto_flush_interval().min(MAX_FLUSH_POLL),
            alert_config: AlertConfig::default(),
            stop: StopHandle::default(),
            state,
        })
    }

    pub fn with_alert_config(mut self, alert_config: AlertConfig) -> Self {
        self.alert_config = alert_config;
        self
    }

    /// Share a stop flag created before the pipeline, e.g. by a signal handler
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions
    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Process the source until it ends or a stop is requested.
    ///
    /// The sink is shared so the caller can retry a flush if the final write
    /// fails; the unwritten records stay buffered in it.
    pub async fn run<S, P>(
        &self,
        source: S,
        dms: DmsModule,
        sink: Arc<BatchedSink<DecisionRecord>>,
        presenter: P,
    ) -> Result<PipelineSummary, PipelineError>
    where
        S: LandmarkSource + 'static,
        P: Presenter,
    {
        let current = self.state();
        if current != PipelineState::Idle {
            return Err(PipelineError::InvalidState(current));
        }

        let fps = FpsMeter::new(self.fps_window)?;
        match source.nominal_fps() {
            Some(rate) => info!("Source delivers {:.1} fps nominally", rate),
            None => debug!("Source frame rate unknown"),
        }
        let (presentation_tx, presentation_rx) = broadcast::channel(self.presentation_capacity);
        let (persistence_tx, persistence_rx) = mpsc::channel(self.persistence_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let presentation = spawn_presentation(
            presenter,
            AlertManager::new(self.alert_config.clone()),
            presentation_rx,
        );
        let writer = spawn_writer(sink.clone(), persistence_rx, presentation_tx.clone());
        let auto_flush = spawn_auto_flush(sink.clone(), self.flush_poll_interval, shutdown_rx);

        let frame_loop = FrameLoop {
            source,
            dms,
            fps,
            stop: self.stop.clone(),
            presentation: presentation_tx.clone(),
            persistence: persistence_tx,
        };

        self.state.send_replace(PipelineState::Running);
        info!("Pipeline running, writing to {}", sink.path().display());

        let loop_result = tokio::task::spawn_blocking(move || frame_loop.run()).await;

        self.state.send_replace(PipelineState::Draining);
        info!("Pipeline draining");

        // The frame loop has dropped its queue sender, so the writer finishes
        // once it has taken every queued record.
        let writer_result = writer.await;

        let _ = shutdown_tx.send(true);
        if let Err(e) = auto_flush.await {
            warn!("Auto-flush task ended abnormally: {}", e);
        }

        let flush_result = sink.flush_batch();
        if let Err(e) = &flush_result {
            error!("Final flush failed: {}", e);
            let _ = presentation_tx.send(PresentationEvent::Status(format!(
                "could not save results: {}",
                e
            )));
        }

        drop(presentation_tx);
        if let Err(e) = presentation.await {
            warn!("Presentation task ended abnormally: {}", e);
        }

        self.state.send_replace(PipelineState::Stopped);

        let (frames_processed, end_reason) =
            loop_result.map_err(|e| PipelineError::TaskFailed(format!("frame loop: {}", e)))?;
        writer_result.map_err(|e| PipelineError::TaskFailed(format!("writer: {}", e)))?;
        flush_result?;

        let records_persisted = sink.status()?.rows_written;
        info!(
            "Pipeline stopped after {} frames ({:?}), {} records persisted",
            frames_processed, end_reason, records_persisted
        );

        Ok(PipelineSummary {
            frames_processed,
            records_persisted,
            end_reason,
            output_path: sink.path().to_path_buf(),
        })
    }
}

/// State moved onto the blocking frame-loop task
struct FrameLoop<S> {
    source: S,
    dms: DmsModule,
    fps: FpsMeter,
    stop: StopHandle,
    presentation: broadcast::Sender<PresentationEvent>,
    persistence: mpsc::Sender<DecisionRecord>,
}

impl<S: LandmarkSource> FrameLoop<S> {
    fn run(mut self) -> (u64, EndReason) {
        let mut frame_index = 0u64;

        let reason = loop {
            if self.stop.is_stop_requested() {
                break EndReason::StopRequested;
            }

            let (analysis, timestamp_ms) = match self.source.next_frame() {
                Ok(SourceFrame::Face(frame)) => {
                    (self.dms.analyze(Some(&frame)), frame.timestamp_ms())
                }
                Ok(SourceFrame::NoFace { timestamp_ms }) => (self.dms.analyze(None), timestamp_ms),
                Ok(SourceFrame::EndOfStream) => break EndReason::EndOfStream,
                Err(e) => {
                    error!("Landmark source failed: {}", e);
                    let _ = self
                        .presentation
                        .send(PresentationEvent::Status(format!("source failed: {}", e)));
                    break EndReason::SourceFailed(e.to_string());
                }
            };

            let fps = self.fps.tick();
            let record = DecisionRecord::new(frame_index, timestamp_ms, &analysis, fps);
            frame_index += 1;

            // No receivers only means nobody is watching
            let _ = self.presentation.send(PresentationEvent::Record(record.clone()));

            if !self.persist(record) {
                break EndReason::PersistenceClosed;
            }
        };

        debug!("Frame loop finished after {} frames", frame_index);
        (frame_index, reason)
    }

    /// Queue a record for the writer, waiting for space rather than dropping it
    fn persist(&self, record: DecisionRecord) -> bool {
        match self.persistence.try_send(record) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(record)) => {
                debug!("Persistence queue full, waiting for writer");
                self.persistence.blocking_send(record).is_ok()
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("Persistence writer is gone");
                false
            }
        }
    }
}

/// Feed queued records into the sink in arrival order
fn spawn_writer(
    sink: Arc<BatchedSink<DecisionRecord>>,
    mut records: mpsc::Receiver<DecisionRecord>,
    status: broadcast::Sender<PresentationEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while let Some(record) = records.blocking_recv() {
            if let Err(e) = sink.add_to_batch(record) {
                error!("Failed to persist batch: {}", e);
                let _ = status.send(PresentationEvent::Status(format!(
                    "storage write failed: {}",
                    e
                )));
            }
        }
        debug!("Persistence writer finished");
    })
}
