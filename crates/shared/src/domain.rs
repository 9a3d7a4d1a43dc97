use serde::{Deserialize, Serialize};

/// Opaque session identifier issued by the backend on upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The five sequential pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Upload,
    Column,
    Categories,
    Classify,
    Results,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Upload,
        Stage::Column,
        Stage::Categories,
        Stage::Classify,
        Stage::Results,
    ];

    /// 1-based stage number as presented to the user.
    pub fn number(self) -> usize {
        self as usize + 1
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Column => "column",
            Stage::Categories => "categories",
            Stage::Classify => "classify",
            Stage::Results => "results",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-stage visual state. A later stage can be active while an earlier
/// stage is merely completed; stages are not strictly linear gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Active,
    Completed,
}

/// Backend-reported lifecycle of one classification run. `starting` is a
/// short-lived value the backend emits between accepting the request and
/// entering `processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    NotStarted,
    Starting,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    Csv,
    Pdf,
}

impl ArtifactFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactFormat::Csv => "csv",
            ArtifactFormat::Pdf => "pdf",
        }
    }
}
