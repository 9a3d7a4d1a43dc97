use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::JobStatus;

/// One user-editable classification bucket as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPayload {
    pub title: String,
    pub description: String,
}

/// Response to `POST /upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub session_id: String,
    pub filename: String,
    pub total_rows: u64,
    pub columns: Vec<String>,
    #[serde(default)]
    pub detected_verbatim_column: Option<String>,
    pub detection_confident: bool,
    /// Up to five raw rows for display; shape depends on the uploaded file.
    #[serde(default)]
    pub preview: Vec<HashMap<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetColumnRequest {
    pub column: String,
}

/// Response to `GET /sessions/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub filename: String,
    pub total_rows: u64,
    pub columns: Vec<String>,
    #[serde(default)]
    pub verbatim_column: Option<String>,
    pub detection_confident: bool,
    pub has_categories: bool,
    pub has_classifications: bool,
}

/// Response to `POST /sessions/{id}/suggest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub categories: Vec<CategoryPayload>,
    pub sample_size: u64,
    pub total_comments: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmCategoriesRequest {
    pub categories: Vec<CategoryPayload>,
}

/// Response to `POST /sessions/{id}/classify`. The run itself is
/// asynchronous; progress is observed separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartClassifyResponse {
    #[serde(default)]
    pub message: String,
}

/// One progress report, identical in shape for the poll endpoint and for
/// each event on the SSE stream. Every field except `status` may be absent
/// depending on how far the job has advanced.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProgressSnapshot {
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub processed: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub remaining: u64,
    #[serde(default)]
    pub processing_rate: f64,
    #[serde(default)]
    pub estimated_time_remaining: Option<f64>,
    #[serde(default)]
    pub current_step: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response to `GET /sessions/{id}/classify/status` once a run finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalStatus {
    pub total_rows: u64,
    #[serde(default)]
    pub category_counts: HashMap<String, u64>,
}

/// Per-category slice of the detailed report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportCategory {
    pub title: String,
    pub description: String,
    pub count: u64,
    pub percentage: f64,
    #[serde(default)]
    pub sample_quotes: Vec<String>,
}

/// Response to `GET /sessions/{id}/report`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    pub session_id: String,
    pub filename: String,
    pub total_rows: u64,
    #[serde(default)]
    pub verbatim_column: Option<String>,
    pub categories: Vec<ReportCategory>,
}
