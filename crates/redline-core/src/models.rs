//! Core data models used throughout Redline.
//!
//! These types represent the chunks, comments, verdicts and task records
//! that flow through the comment-resolution pipeline. Every field is
//! required at construction time; tolerance for missing values exists only
//! at the completion-output parsing boundary (see [`crate::verdict`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of the revision a document or collection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Version {
    V1,
    V2,
}

impl Version {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Version::V1 => "v1",
            Version::V2 => "v2",
        }
    }
}

/// One embedded window of a document version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-based position within the source document.
    pub index: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A comment as read from the comments file, before embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentLine {
    /// `C<n>`, where `n` is the 1-based position among non-blank lines.
    pub id: String,
    pub text: String,
}

/// A reviewer comment with its query-role embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// An extracted, chunked and embedded document version, owned by one task.
#[derive(Debug, Clone)]
pub struct DocumentVersion {
    pub version: Version,
    pub text: String,
    pub chunks: Vec<Chunk>,
}

/// A chunk returned from top-k retrieval, with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub index: usize,
    pub text: String,
    pub score: f32,
}

/// Classification outcome for one comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Addressed,
    PartiallyAddressed,
    NotAddressed,
    Error,
}

impl Status {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Status::Addressed => "addressed",
            Status::PartiallyAddressed => "partially_addressed",
            Status::NotAddressed => "not_addressed",
            Status::Error => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error)
    }
}

/// Per-comment verdict. The ordered list of these is a task's report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub comment_id: String,
    pub comment_text: String,
    pub status: Status,
    pub explanation: String,
    pub evidence_v1: String,
    pub evidence_v2: String,
    pub suggestion: String,
}

/// Verdict counts over a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub total: usize,
    pub addressed: usize,
    pub partially_addressed: usize,
    pub not_addressed: usize,
    pub error: usize,
}

impl ReportSummary {
    pub fn from_results(results: &[AnalysisResult]) -> Self {
        let mut summary = ReportSummary {
            total: results.len(),
            ..Default::default()
        };
        for r in results {
            match r.status {
                Status::Addressed => summary.addressed += 1,
                Status::PartiallyAddressed => summary.partially_addressed += 1,
                Status::NotAddressed => summary.not_addressed += 1,
                Status::Error => summary.error += 1,
            }
        }
        summary
    }
}

/// Lifecycle status of an analysis task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Processing,
    Completed,
    Error,
}

/// Externally observable processing stage.
///
/// Stages are strictly ordered; a task only ever moves forward, or to
/// [`Stage::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Uploading,
    ProcessingV1,
    ProcessingV2,
    ProcessingComments,
    CreatingVectorDb,
    AnalyzingComments,
    SavingResults,
    Completed,
    Error,
}

impl Stage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Stage::Uploading => "uploading",
            Stage::ProcessingV1 => "processing_v1",
            Stage::ProcessingV2 => "processing_v2",
            Stage::ProcessingComments => "processing_comments",
            Stage::CreatingVectorDb => "creating_vector_db",
            Stage::AnalyzingComments => "analyzing_comments",
            Stage::SavingResults => "saving_results",
            Stage::Completed => "completed",
            Stage::Error => "error",
        }
    }

    /// Rough completion percentage shown to status pollers.
    pub const fn percent(&self) -> u8 {
        match self {
            Stage::Uploading => 10,
            Stage::ProcessingV1 => 20,
            Stage::ProcessingV2 => 40,
            Stage::ProcessingComments => 60,
            Stage::CreatingVectorDb => 70,
            Stage::AnalyzingComments => 80,
            Stage::SavingResults => 95,
            Stage::Completed | Stage::Error => 100,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Error)
    }
}

/// One analysis request's record in the task registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    pub stage: Stage,
    /// `"i/total"` while in [`Stage::AnalyzingComments`].
    pub comment_progress: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub doc_v1: String,
    pub doc_v2: String,
    pub comments: String,
    /// Vector collections owned by this task, dropped on eviction.
    #[serde(default)]
    pub collections: Vec<String>,
    pub report: Option<Vec<AnalysisResult>>,
    pub report_path: Option<String>,
}

impl Task {
    pub fn new(id: String, doc_v1: &str, doc_v2: &str, comments: &str) -> Self {
        Task {
            id,
            status: TaskStatus::Processing,
            stage: Stage::Uploading,
            comment_progress: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
            doc_v1: doc_v1.to_string(),
            doc_v2: doc_v2.to_string(),
            comments: comments.to_string(),
            collections: Vec::new(),
            report: None,
            report_path: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != TaskStatus::Processing
    }
}

/// Generate a fresh task id (`task_<32 hex chars>`).
pub fn new_task_id() -> String {
    format!("task_{}", Uuid::new_v4().simple())
}
