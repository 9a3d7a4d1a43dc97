pub mod backend;
pub mod categories;
pub mod error;
pub mod progress;
pub mod session;
pub mod wizard;

pub use backend::{BackendApi, HttpBackend, ProgressStream};
pub use categories::{CancelOutcome, CategoryEntry, CategoryListEditor};
pub use error::WorkflowError;
pub use progress::{
    ClassificationJob, JobProgressMonitor, MonitorEvent, ProgressDelivery, DEFAULT_POLL_INTERVAL,
};
pub use session::SessionContext;
pub use wizard::{
    CategoryView, SampleCoverage, UploadSummary, WizardController, WorkflowEvent, WorkflowSnapshot,
};

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
