use std::sync::Arc;
use std::time::Duration;

use shared::domain::{ArtifactFormat, SessionId, Stage, StageStatus};
use shared::protocol::{
    FinalStatus, ReportData, SessionInfo, SuggestResponse, UploadResponse,
};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

use crate::backend::BackendApi;
use crate::categories::{CancelOutcome, CategoryListEditor};
use crate::error::WorkflowError;
use crate::progress::{
    ClassificationJob, JobProgressMonitor, MonitorEvent, ProgressDelivery,
};
use crate::session::SessionContext;

/// Upload limit enforced before any request is made.
const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// File metadata reported by the upload stage.
#[derive(Debug, Clone)]
pub struct UploadSummary {
    pub filename: String,
    pub total_rows: u64,
    pub columns: Vec<String>,
    pub detected_verbatim_column: Option<String>,
    pub detection_confident: bool,
}

/// How much of the comment corpus the category suggestion was based on.
#[derive(Debug, Clone, Copy)]
pub struct SampleCoverage {
    pub sample_size: u64,
    pub total_comments: u64,
}

impl SampleCoverage {
    pub fn percent(&self) -> f64 {
        if self.total_comments == 0 {
            0.0
        } else {
            self.sample_size as f64 / self.total_comments as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct CategoryView {
    pub title: String,
    pub description: String,
    pub editing: bool,
}

/// Immutable view of the whole workflow, emitted after every state
/// transition. A rendering layer consumes these instead of reaching into
/// the controller.
#[derive(Debug, Clone)]
pub struct WorkflowSnapshot {
    pub session_id: Option<SessionId>,
    pub stage: Stage,
    pub stages: [StageStatus; 5],
    pub upload: Option<UploadSummary>,
    pub categories: Vec<CategoryView>,
    pub coverage: Option<SampleCoverage>,
    pub categories_confirmed: bool,
    pub results: Option<FinalStatus>,
}

#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    StageChanged(WorkflowSnapshot),
    CategoriesGenerated {
        count: usize,
        sample_size: u64,
        total_comments: u64,
    },
    JobProgress(ClassificationJob),
    JobDeliveryDegraded {
        reason: String,
    },
    ClassificationCompleted(FinalStatus),
    ClassificationFailed(String),
}

#[derive(Default)]
struct WizardState {
    session: SessionContext,
    categories: CategoryListEditor,
    upload: Option<UploadSummary>,
    coverage: Option<SampleCoverage>,
    categories_confirmed: bool,
    results: Option<FinalStatus>,
}

impl WizardState {
    fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            session_id: self.session.session_id().cloned(),
            stage: self.session.stage(),
            stages: self.session.statuses(),
            upload: self.upload.clone(),
            categories: self
                .categories
                .entries()
                .iter()
                .map(|entry| CategoryView {
                    title: entry.title().to_string(),
                    description: entry.description().to_string(),
                    editing: entry.is_editing(),
                })
                .collect(),
            coverage: self.coverage,
            categories_confirmed: self.categories_confirmed,
            results: self.results.clone(),
        }
    }

    fn session_id(&self) -> Result<SessionId, WorkflowError> {
        self.session
            .session_id()
            .cloned()
            .ok_or_else(|| WorkflowError::validation("no active session; upload a file first"))
    }
}

/// Top-level state machine for the five-stage pipeline.
///
/// Stages advance strictly forward, driven by the completion signal of each
/// stage's handler. A transport failure in any stage-advancing call leaves
/// `stage`/`stageStatus` untouched so the triggering control can simply be
/// retried.
pub struct WizardController {
    backend: Arc<dyn BackendApi>,
    monitor: JobProgressMonitor,
    inner: Mutex<WizardState>,
    events: broadcast::Sender<WorkflowEvent>,
    job_task: Mutex<Option<JoinHandle<()>>>,
}

impl WizardController {
    pub fn new(backend: Arc<dyn BackendApi>) -> Arc<Self> {
        let monitor = JobProgressMonitor::new(Arc::clone(&backend));
        Self::with_monitor(backend, monitor)
    }

    pub fn with_poll_interval(backend: Arc<dyn BackendApi>, poll_interval: Duration) -> Arc<Self> {
        let monitor = JobProgressMonitor::with_poll_interval(Arc::clone(&backend), poll_interval);
        Self::with_monitor(backend, monitor)
    }

    fn with_monitor(backend: Arc<dyn BackendApi>, monitor: JobProgressMonitor) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            backend,
            monitor,
            inner: Mutex::new(WizardState::default()),
            events,
            job_task: Mutex::new(None),
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> WorkflowSnapshot {
        self.inner.lock().await.snapshot()
    }

    /// Stage 1. Uploads the file and, on success, starts a fresh session.
    /// When the backend reports confident column detection, stage 2 is
    /// skipped and category generation becomes available immediately.
    pub async fn upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadResponse, WorkflowError> {
        validate_upload_file(filename, bytes.len())?;

        let response = self.backend.upload_file(filename, bytes).await?;

        // A new upload is a workflow restart: any monitor from a previous
        // run must not touch the new session's state.
        self.monitor.stop().await;
        if let Some(task) = self.job_task.lock().await.take() {
            task.abort();
        }

        let snapshot = {
            let mut guard = self.inner.lock().await;
            *guard = WizardState::default();
            guard.session.begin(SessionId(response.session_id.clone()));
            guard.session.complete(Stage::Upload);
            guard.session.activate(Stage::Column);
            if response.detection_confident {
                guard.session.complete(Stage::Column);
                guard.session.activate(Stage::Categories);
            }
            guard.upload = Some(UploadSummary {
                filename: response.filename.clone(),
                total_rows: response.total_rows,
                columns: response.columns.clone(),
                detected_verbatim_column: response.detected_verbatim_column.clone(),
                detection_confident: response.detection_confident,
            });
            guard.snapshot()
        };
        info!(
            session = %response.session_id,
            rows = response.total_rows,
            confident = response.detection_confident,
            "file uploaded"
        );
        let _ = self.events.send(WorkflowEvent::StageChanged(snapshot));
        Ok(response)
    }

    /// Stage 2. Confirms (or overrides) the verbatim column.
    pub async fn confirm_column(&self, column: &str) -> Result<(), WorkflowError> {
        let session_id = {
            let guard = self.inner.lock().await;
            if guard.session.stage() > Stage::Categories {
                return Err(WorkflowError::validation(
                    "the verbatim column can no longer be changed at this stage",
                ));
            }
            if let Some(upload) = &guard.upload {
                if !upload.columns.iter().any(|c| c == column) {
                    return Err(WorkflowError::validation(format!(
                        "column '{column}' does not exist in the uploaded file"
                    )));
                }
            }
            guard.session_id()?
        };

        self.backend.set_verbatim_column(&session_id, column).await?;

        let snapshot = {
            let mut guard = self.inner.lock().await;
            guard.session.complete(Stage::Column);
            guard.session.activate(Stage::Categories);
            guard.snapshot()
        };
        let _ = self.events.send(WorkflowEvent::StageChanged(snapshot));
        Ok(())
    }

    /// Stage 3, first half. Fetches suggested categories and loads them
    /// into the editor. Re-invokable: regenerating replaces the editable
    /// list (and voids any earlier confirmation). Stage 3 stays active
    /// until the user explicitly confirms.
    pub async fn generate_categories(&self) -> Result<SuggestResponse, WorkflowError> {
        let session_id = {
            let guard = self.inner.lock().await;
            if guard.session.stage_status(Stage::Categories) == StageStatus::Pending {
                return Err(WorkflowError::validation(
                    "confirm the verbatim column before generating categories",
                ));
            }
            if guard.session.stage() == Stage::Results {
                return Err(WorkflowError::validation(
                    "this workflow already finished; upload a new file to start over",
                ));
            }
            guard.session_id()?
        };

        let response = self.backend.suggest_categories(&session_id).await?;

        let count = response.categories.len();
        {
            let mut guard = self.inner.lock().await;
            guard.categories.load(response.categories.clone());
            guard.coverage = Some(SampleCoverage {
                sample_size: response.sample_size,
                total_comments: response.total_comments,
            });
            guard.categories_confirmed = false;
        }
        info!(
            session = %session_id,
            categories = count,
            sample_size = response.sample_size,
            total_comments = response.total_comments,
            "categories generated"
        );
        let _ = self.events.send(WorkflowEvent::CategoriesGenerated {
            count,
            sample_size: response.sample_size,
            total_comments: response.total_comments,
        });
        Ok(response)
    }

    /// Stage 3, second half. Transmits the current category list; only on
    /// success does stage 3 complete and stage 4 activate. The confirmed
    /// snapshot is what the classification job will use — later edits only
    /// take effect after confirming again.
    pub async fn confirm_categories(&self) -> Result<(), WorkflowError> {
        let (session_id, payloads) = {
            let guard = self.inner.lock().await;
            if guard.categories.is_empty() {
                return Err(WorkflowError::validation(
                    "generate or add at least one category before confirming",
                ));
            }
            (guard.session_id()?, guard.categories.payloads())
        };

        self.backend
            .confirm_categories(&session_id, &payloads)
            .await?;

        let snapshot = {
            let mut guard = self.inner.lock().await;
            guard.categories_confirmed = true;
            guard.session.complete(Stage::Categories);
            guard.session.activate(Stage::Classify);
            guard.snapshot()
        };
        let _ = self.events.send(WorkflowEvent::StageChanged(snapshot));
        Ok(())
    }

    /// Stage 4. Starts the classification run and monitors it to a
    /// terminal state. Requires a prior successful `confirm_categories`;
    /// starting a new run discards any previous run's monitoring.
    pub async fn classify(
        self: &Arc<Self>,
        delivery: ProgressDelivery,
    ) -> Result<(), WorkflowError> {
        let session_id = {
            let guard = self.inner.lock().await;
            if !guard.categories_confirmed {
                return Err(WorkflowError::validation(
                    "confirm categories before starting classification",
                ));
            }
            guard.session_id()?
        };

        self.backend.start_classification(&session_id).await?;

        let mut monitor_rx = self.monitor.subscribe();
        self.monitor.start(session_id, delivery).await;

        let wizard = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                match monitor_rx.recv().await {
                    Ok(MonitorEvent::Progress(job)) => {
                        let _ = wizard.events.send(WorkflowEvent::JobProgress(job));
                    }
                    Ok(MonitorEvent::DeliveryDegraded { reason }) => {
                        let _ = wizard
                            .events
                            .send(WorkflowEvent::JobDeliveryDegraded { reason });
                    }
                    Ok(MonitorEvent::Completed(results)) => {
                        wizard.finish_classification(results).await;
                        break;
                    }
                    Ok(MonitorEvent::Failed(message)) => {
                        let _ = wizard
                            .events
                            .send(WorkflowEvent::ClassificationFailed(message));
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let previous = self.job_task.lock().await.replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    async fn finish_classification(&self, results: FinalStatus) {
        let snapshot = {
            let mut guard = self.inner.lock().await;
            guard.session.complete(Stage::Classify);
            guard.session.activate(Stage::Results);
            guard.results = Some(results.clone());
            guard.snapshot()
        };
        let _ = self.events.send(WorkflowEvent::StageChanged(snapshot));
        let _ = self
            .events
            .send(WorkflowEvent::ClassificationCompleted(results));
    }

    // Category editing passthroughs. Structural mutations renumber indices;
    // callers must re-resolve any index captured beforehand.

    pub async fn add_category(&self) -> usize {
        self.inner.lock().await.categories.add()
    }

    pub async fn begin_edit_category(&self, index: usize) -> Result<(), WorkflowError> {
        self.inner.lock().await.categories.begin_edit(index)
    }

    pub async fn save_category(
        &self,
        index: usize,
        title: &str,
        description: &str,
    ) -> Result<(), WorkflowError> {
        self.inner
            .lock()
            .await
            .categories
            .save(index, title, description)
    }

    pub async fn cancel_category(&self, index: usize) -> Result<CancelOutcome, WorkflowError> {
        self.inner.lock().await.categories.cancel(index)
    }

    pub async fn delete_category(&self, index: usize) -> Result<(), WorkflowError> {
        self.inner.lock().await.categories.delete(index)
    }

    /// One-shot session introspection.
    pub async fn session_info(&self) -> Result<SessionInfo, WorkflowError> {
        let session_id = self.inner.lock().await.session_id()?;
        self.backend.session_info(&session_id).await
    }

    /// Detailed per-category report for the results stage.
    pub async fn fetch_report(&self) -> Result<ReportData, WorkflowError> {
        let session_id = self.require_results().await?;
        self.backend.fetch_report(&session_id).await
    }

    /// Stage 5. Downloads the classified data (CSV) or the rendered report
    /// (PDF, optionally embedding a pre-rendered chart image).
    pub async fn download(
        &self,
        format: ArtifactFormat,
        chart_png: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, WorkflowError> {
        let session_id = self.require_results().await?;
        self.backend
            .download_artifact(&session_id, format, chart_png)
            .await
    }

    async fn require_results(&self) -> Result<SessionId, WorkflowError> {
        let guard = self.inner.lock().await;
        if guard.results.is_none() {
            return Err(WorkflowError::validation(
                "no classification results available yet",
            ));
        }
        guard.session_id()
    }
}

fn validate_upload_file(filename: &str, size: usize) -> Result<(), WorkflowError> {
    let allowed = filename
        .rsplit_once('.')
        .map(|(_, ext)| matches!(ext.to_ascii_lowercase().as_str(), "xlsx" | "xls" | "csv"))
        .unwrap_or(false);
    if !allowed {
        return Err(WorkflowError::validation(
            "please select a valid Excel or CSV file (.xlsx, .xls, or .csv)",
        ));
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(WorkflowError::validation("file size must be less than 5MB"));
    }
    Ok(())
}
