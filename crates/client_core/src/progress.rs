use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use shared::domain::{JobStatus, SessionId};
use shared::protocol::{FinalStatus, ProgressSnapshot};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backend::{BackendApi, ProgressStream};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(750);

/// Normalized view of one classification run, fed identically by the poll
/// endpoint and the SSE stream.
#[derive(Debug, Clone, Default)]
pub struct ClassificationJob {
    pub status: JobStatus,
    /// 0–100. Expected to be non-decreasing while processing; backend
    /// misbehavior is not corrected here.
    pub progress: f64,
    pub processed: u64,
    pub total: u64,
    pub remaining: u64,
    /// Items per second; advisory, may be zero.
    pub processing_rate: f64,
    /// `None` means unknown.
    pub estimated_seconds_remaining: Option<f64>,
    pub current_step: String,
    error: Option<String>,
}

impl ClassificationJob {
    fn failure_message(&self) -> String {
        self.error
            .clone()
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| {
                if self.current_step.is_empty() {
                    "classification failed".to_string()
                } else {
                    self.current_step.clone()
                }
            })
    }
}

impl From<ProgressSnapshot> for ClassificationJob {
    fn from(snapshot: ProgressSnapshot) -> Self {
        Self {
            status: snapshot.status,
            progress: snapshot.progress,
            processed: snapshot.processed,
            total: snapshot.total,
            remaining: snapshot.remaining,
            processing_rate: snapshot.processing_rate,
            estimated_seconds_remaining: snapshot
                .estimated_time_remaining
                .filter(|secs| *secs > 0.0),
            current_step: snapshot.current_step,
            error: snapshot.error,
        }
    }
}

/// How progress reports are delivered. Exactly one mechanism is ever active
/// for a given job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressDelivery {
    Poll,
    Stream,
}

#[derive(Debug, Clone)]
pub enum MonitorEvent {
    Progress(ClassificationJob),
    /// The push stream broke before reaching a terminal state; monitoring
    /// continues over the poll endpoint.
    DeliveryDegraded { reason: String },
    Completed(FinalStatus),
    Failed(String),
}

/// Drives one backend classification job to a terminal state.
///
/// `start` cancels any monitor task from a previous run before spawning a
/// new one, so the job state has exactly one writer at a time. The monitor
/// never restarts a job on its own; after `Completed`/`Failed` a fresh
/// `start` is required.
pub struct JobProgressMonitor {
    backend: Arc<dyn BackendApi>,
    poll_interval: Duration,
    events: broadcast::Sender<MonitorEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl JobProgressMonitor {
    pub fn new(backend: Arc<dyn BackendApi>) -> Self {
        Self::with_poll_interval(backend, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(backend: Arc<dyn BackendApi>, poll_interval: Duration) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            backend,
            poll_interval,
            events,
            task: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Begins monitoring `session`'s job, discarding any previous run's
    /// monitor so stale updates cannot reach a newer job's state.
    pub async fn start(&self, session: SessionId, delivery: ProgressDelivery) {
        let backend = Arc::clone(&self.backend);
        let events = self.events.clone();
        let poll_interval = self.poll_interval;
        let handle = tokio::spawn(async move {
            run_monitor(backend, session, delivery, poll_interval, events).await;
        });

        let previous = self.task.lock().await.replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Cancels the active monitor task, if any.
    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
    }
}

async fn run_monitor(
    backend: Arc<dyn BackendApi>,
    session: SessionId,
    delivery: ProgressDelivery,
    poll_interval: Duration,
    events: broadcast::Sender<MonitorEvent>,
) {
    if delivery == ProgressDelivery::Stream {
        let reason = match backend.subscribe_progress(&session).await {
            Ok(stream) => {
                match consume_stream(&backend, &session, stream, &events).await {
                    StreamEnd::Terminal => return,
                    StreamEnd::Broken(reason) => reason,
                }
            }
            Err(err) => err.to_string(),
        };
        warn!(session = %session, "progress stream degraded, falling back to polling: {reason}");
        let _ = events.send(MonitorEvent::DeliveryDegraded { reason });
    }

    poll_loop(&backend, &session, poll_interval, &events).await;
}

enum StreamEnd {
    /// The stream delivered a terminal status and the final result was
    /// handed off.
    Terminal,
    /// Transport-level failure or premature close; carries the reason.
    Broken(String),
}

async fn consume_stream(
    backend: &Arc<dyn BackendApi>,
    session: &SessionId,
    mut stream: ProgressStream,
    events: &broadcast::Sender<MonitorEvent>,
) -> StreamEnd {
    while let Some(item) = stream.next().await {
        match item {
            Ok(snapshot) => {
                let job = ClassificationJob::from(snapshot);
                let status = job.status;
                let failure = job.failure_message();
                let _ = events.send(MonitorEvent::Progress(job));
                if status.is_terminal() {
                    // The stream is not assumed to carry the final payload;
                    // results come from the one-shot status request.
                    drop(stream);
                    finish(backend, session, status, failure, events).await;
                    return StreamEnd::Terminal;
                }
            }
            Err(err) => return StreamEnd::Broken(err.to_string()),
        }
    }
    StreamEnd::Broken("stream closed before reaching a terminal status".to_string())
}

async fn poll_loop(
    backend: &Arc<dyn BackendApi>,
    session: &SessionId,
    interval: Duration,
    events: &broadcast::Sender<MonitorEvent>,
) {
    let mut delay = interval;
    loop {
        match backend.poll_progress(session).await {
            Ok(snapshot) => {
                delay = interval;
                let job = ClassificationJob::from(snapshot);
                let status = job.status;
                let failure = job.failure_message();
                let _ = events.send(MonitorEvent::Progress(job));
                if status.is_terminal() {
                    finish(backend, session, status, failure, events).await;
                    return;
                }
            }
            Err(err) => {
                // A single failed poll must not be mistaken for job
                // failure; retry on a longer cadence.
                warn!(session = %session, "progress poll failed, will retry: {err}");
                delay = interval * 2;
            }
        }
        tokio::time::sleep(delay).await;
    }
}

async fn finish(
    backend: &Arc<dyn BackendApi>,
    session: &SessionId,
    status: JobStatus,
    failure: String,
    events: &broadcast::Sender<MonitorEvent>,
) {
    if status == JobStatus::Failed {
        let _ = events.send(MonitorEvent::Failed(failure));
        return;
    }

    match backend.final_status(session).await {
        Ok(final_status) => {
            info!(
                session = %session,
                total_rows = final_status.total_rows,
                "classification completed"
            );
            let _ = events.send(MonitorEvent::Completed(final_status));
        }
        Err(err) => {
            let _ = events.send(MonitorEvent::Failed(format!(
                "classification finished but results could not be fetched: {err}"
            )));
        }
    }
}

impl std::fmt::Debug for JobProgressMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobProgressMonitor")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
