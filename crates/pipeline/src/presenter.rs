//! Presentation sink

use alerting::{Alert, AlertManager};
use dms::DecisionRecord;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Event published on the presentation queue
#[derive(Debug, Clone)]
pub enum PresentationEvent {
    Record(DecisionRecord),
    /// Operator-facing status message, e.g. a storage failure
    Status(String),
}

/// Receives decisions, alerts and status messages for display
pub trait Presenter: Send + 'static {
    fn on_record(&mut self, record: &DecisionRecord);

    fn on_alert(&mut self, alert: &Alert);

    fn on_status(&mut self, message: &str);
}

/// Drain the presentation queue until every sender is gone.
///
/// Presenters are synchronous, so they run on the blocking pool. A presenter
/// that falls behind loses the oldest events; it is told how many.
pub(crate) fn spawn_presentation<P: Presenter>(
    mut presenter: P,
    mut alerts: AlertManager,
    mut events: broadcast::Receiver<PresentationEvent>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        loop {
            match events.blocking_recv() {
                Ok(PresentationEvent::Record(record)) => {
                    presenter.on_record(&record);
                    for alert in alerts.evaluate(&record) {
                        presenter.on_alert(&alert);
                    }
                }
                Ok(PresentationEvent::Status(message)) => presenter.on_status(&message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Presentation lagging, {} events dropped", skipped);
                    presenter.on_status(&format!("display lagging, {} updates skipped", skipped));
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Presentation queue closed");
                    break;
                }
            }
        }
    })
}
