//! Analysis orchestration.
//!
//! One [`Pipeline`] is shared by every task in the process. Each submitted
//! task runs on its own tokio task through a fixed sequence of stages:
//!
//! ```text
//! uploading → processing_v1 → processing_v2 → processing_comments
//!           → creating_vector_db → analyzing_comments → saving_results → completed
//! ```
//!
//! Any stage failure moves the task to `error` with the failure message and
//! discards partial results. A bad completion reply for one comment is not
//! a stage failure; it becomes an `error`-status entry in the report.
//!
//! The registry is updated *before* a stage's work begins, so a poller
//! always sees the stage currently running.

use anyhow::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use redline_core::chunk::split_text;
use redline_core::embedding::{embed, EmbeddingError, EmbeddingProvider, EmbeddingRole, RolePrefixes};
use redline_core::index::{CollectionNaming, IndexError, VectorIndex};
use redline_core::models::{
    new_task_id, AnalysisResult, Chunk, Comment, DocumentVersion, Stage, Task, TaskStatus, Version,
};

use crate::classifier::CommentClassifier;
use crate::comments::load_comments;
use crate::config::Config;
use crate::embedding::create_provider;
use crate::extract::{load_document_text, ExtractError};
use crate::index::create_index;
use crate::llm::{CompletionClient, OpenAiCompletionClient};
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};
use crate::report::ReportStore;
use crate::tasks::TaskRegistry;

/// Why a task ended in `error`. The `Display` text is what status pollers see.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read document {version}: {source}")]
    DocumentUnreadable {
        version: &'static str,
        #[source]
        source: ExtractError,
    },
    #[error("failed to read comments: {0}")]
    CommentsUnreadable(String),
    #[error("document {0} produced no text chunks")]
    NoChunks(&'static str),
    #[error("no comments found in the comments file")]
    NoComments,
    #[error("embedding failed for {target}: {source}")]
    Embedding {
        target: &'static str,
        #[source]
        source: EmbeddingError,
    },
    #[error("vector index error: {0}")]
    Index(#[from] IndexError),
    #[error("completion service failed on comment {comment_id}: {message}")]
    Completion { comment_id: String, message: String },
    #[error("failed to save report: {0}")]
    Report(String),
}

/// Input files for one analysis, plus the names the caller knows them by.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub doc_v1: PathBuf,
    pub doc_v2: PathBuf,
    pub comments: PathBuf,
    /// Caller-supplied name of the first version; its stem becomes the
    /// collection base name.
    pub doc_v1_name: String,
    pub doc_v2_name: String,
    pub comments_name: String,
}

impl AnalysisRequest {
    /// A request whose display names are the files' own names.
    pub fn from_paths(doc_v1: &Path, doc_v2: &Path, comments: &Path) -> Self {
        Self {
            doc_v1_name: file_name(doc_v1),
            doc_v2_name: file_name(doc_v2),
            comments_name: file_name(comments),
            doc_v1: doc_v1.to_path_buf(),
            doc_v2: doc_v2.to_path_buf(),
            comments: comments.to_path_buf(),
        }
    }

    /// File stem of `doc_v1_name`.
    pub fn base_name(&self) -> String {
        Path::new(&self.doc_v1_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("document")
            .to_string()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Tunables that are fixed for the lifetime of a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub prefixes: RolePrefixes,
    pub naming: CollectionNaming,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunking.size,
            chunk_overlap: config.chunking.overlap,
            top_k: config.analysis.top_k,
            prefixes: config.embedding.prefixes(),
            naming: config.index.naming(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct Pipeline {
    settings: PipelineSettings,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    classifier: CommentClassifier,
    registry: Arc<TaskRegistry>,
    reports: Option<ReportStore>,
    progress: Arc<dyn ProgressReporter>,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        completion: Arc<dyn CompletionClient>,
        registry: Arc<TaskRegistry>,
    ) -> Self {
        Self {
            settings,
            embedder,
            index,
            classifier: CommentClassifier::new(completion),
            registry,
            reports: None,
            progress: Arc::new(NoProgress),
        }
    }

    /// Build a pipeline with the providers, index and completion client
    /// named in `config`. Reports are persisted under `storage.results_dir`.
    pub fn from_config(config: &Config, registry: Arc<TaskRegistry>) -> Result<Self> {
        let embedder = create_provider(&config.embedding)?;
        let index = create_index(config)?;
        let completion = Arc::new(OpenAiCompletionClient::new(&config.llm)?);
        Ok(Self::new(
            PipelineSettings::from_config(config),
            embedder,
            index,
            completion,
            registry,
        )
        .with_reports(ReportStore::new(&config.storage.results_dir)))
    }

    pub fn with_reports(mut self, reports: ReportStore) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn reports(&self) -> Option<&ReportStore> {
        self.reports.as_ref()
    }

    /// Register a new task in `uploading` and return its id. The caller
    /// stages the input files, then hands them over with [`Pipeline::spawn`].
    pub fn create_task(&self, doc_v1: &str, doc_v2: &str, comments: &str) -> String {
        let task_id = new_task_id();
        self.registry.create(&task_id, doc_v1, doc_v2, comments);
        self.progress.report(ProgressEvent::Stage {
            task_id: task_id.clone(),
            stage: Stage::Uploading,
        });
        task_id
    }

    /// Register a task and start it in the background.
    pub fn submit(self: &Arc<Self>, request: AnalysisRequest) -> String {
        let task_id = self.create_task(
            &request.doc_v1_name,
            &request.doc_v2_name,
            &request.comments_name,
        );
        self.spawn(task_id.clone(), request);
        task_id
    }

    /// Run an already-registered task on the tokio runtime. A panic inside
    /// the run still leaves the task in `error`.
    pub fn spawn(self: &Arc<Self>, task_id: String, request: AnalysisRequest) {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let worker = {
                let pipeline = Arc::clone(&pipeline);
                let task_id = task_id.clone();
                tokio::spawn(async move {
                    pipeline.run(&task_id, &request).await;
                })
            };
            if let Err(e) = worker.await {
                tracing::error!(task_id = %task_id, error = %e, "analysis worker aborted");
                pipeline.fail(&task_id, &format!("analysis worker panicked: {}", e));
                pipeline.discard_collections(&task_id).await;
            }
        });
    }

    /// Drive a registered task to a terminal state and return its final
    /// record. Never fails: any error is recorded on the task.
    pub async fn run(&self, task_id: &str, request: &AnalysisRequest) -> Option<Task> {
        let started = std::time::Instant::now();
        tracing::info!(task_id, doc_v1 = %request.doc_v1_name, doc_v2 = %request.doc_v2_name, "analysis started");

        match self.execute(task_id, request).await {
            Ok(results) => {
                tracing::info!(
                    task_id,
                    comments = results,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "analysis completed"
                );
            }
            Err(e) => {
                tracing::error!(task_id, error = %e, "analysis failed");
                self.fail(task_id, &e.to_string());
                self.discard_collections(task_id).await;
            }
        }
        self.registry.get(task_id)
    }

    /// Move a task to `error`. No-op if it is already terminal.
    pub fn fail(&self, task_id: &str, message: &str) {
        let updated = self.registry.update(task_id, |t| {
            t.status = TaskStatus::Error;
            t.stage = Stage::Error;
            t.error = Some(message.to_string());
            t.completed_at = Some(Utc::now());
            t.comment_progress = None;
            t.report = None;
        });
        if updated {
            self.progress.report(ProgressEvent::Stage {
                task_id: task_id.to_string(),
                stage: Stage::Error,
            });
        }
    }

    /// Evict terminal tasks older than `retention`, drop their collections
    /// and delete expired report files. Returns the evicted tasks.
    pub async fn sweep(&self, retention: Duration) -> Vec<Task> {
        let evicted = self.registry.evict_older_than(retention);
        for task in &evicted {
            for collection in &task.collections {
                if let Err(e) = self.index.drop_collection(collection).await {
                    tracing::warn!(task_id = %task.id, collection = %collection, error = %e, "failed to drop collection");
                }
            }
        }
        if let Some(reports) = &self.reports {
            match reports.cleanup(retention) {
                Ok(removed) => {
                    for id in removed {
                        self.registry.remove(&id);
                    }
                }
                Err(e) => tracing::warn!(error = %format!("{:#}", e), "report cleanup failed"),
            }
        }
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "evicted expired tasks");
        }
        evicted
    }

    async fn execute(&self, task_id: &str, request: &AnalysisRequest) -> Result<usize, PipelineError> {
        self.enter(task_id, Stage::ProcessingV1);
        let v1 = self.process_document(Version::V1, &request.doc_v1).await?;

        self.enter(task_id, Stage::ProcessingV2);
        let v2 = self.process_document(Version::V2, &request.doc_v2).await?;

        self.enter(task_id, Stage::ProcessingComments);
        let comments = self.process_comments(&request.comments).await?;

        self.enter(task_id, Stage::CreatingVectorDb);
        let base = request.base_name();
        let v1_collection = self.settings.naming.name(Version::V1, &base, task_id);
        let v2_collection = self.settings.naming.name(Version::V2, &base, task_id);
        self.registry.update(task_id, |t| {
            t.collections = vec![v1_collection.clone(), v2_collection.clone()];
        });
        for (collection, doc) in [(&v1_collection, &v1), (&v2_collection, &v2)] {
            self.index.recreate_collection(collection).await?;
            self.index.upsert(collection, &doc.chunks).await?;
            tracing::debug!(task_id, collection = %collection, chunks = doc.chunks.len(), "collection populated");
        }

        self.enter(task_id, Stage::AnalyzingComments);
        let total = comments.len();
        self.set_comment_progress(task_id, 0, total);
        let mut results: Vec<AnalysisResult> = Vec::with_capacity(total);
        for (i, comment) in comments.iter().enumerate() {
            let v1_hits = self
                .index
                .search(&v1_collection, &comment.embedding, self.settings.top_k)
                .await?;
            let v2_hits = self
                .index
                .search(&v2_collection, &comment.embedding, self.settings.top_k)
                .await?;
            let result = self
                .classifier
                .classify(comment, &v1_hits, &v2_hits)
                .await
                .map_err(|e| PipelineError::Completion {
                    comment_id: comment.id.clone(),
                    message: format!("{:#}", e),
                })?;
            results.push(result);
            self.set_comment_progress(task_id, i + 1, total);
        }

        self.enter(task_id, Stage::SavingResults);
        let report_path = match &self.reports {
            Some(store) => Some(
                store
                    .save(task_id, &results)
                    .map_err(|e| PipelineError::Report(format!("{:#}", e)))?
                    .display()
                    .to_string(),
            ),
            None => None,
        };

        let count = results.len();
        let completed = self.registry.update(task_id, |t| {
            t.status = TaskStatus::Completed;
            t.stage = Stage::Completed;
            t.completed_at = Some(Utc::now());
            t.report = Some(results);
            t.report_path = report_path;
        });
        if completed {
            self.progress.report(ProgressEvent::Stage {
                task_id: task_id.to_string(),
                stage: Stage::Completed,
            });
        }
        Ok(count)
    }

    /// Extract, chunk and embed one document version.
    async fn process_document(
        &self,
        version: Version,
        path: &Path,
    ) -> Result<DocumentVersion, PipelineError> {
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || load_document_text(&owned))
            .await
            .unwrap_or_else(|e| Err(ExtractError::Aborted(e.to_string())))
            .map_err(|source| PipelineError::DocumentUnreadable {
                version: version.as_str(),
                source,
            })?;
        let pieces = split_text(&text, self.settings.chunk_size, self.settings.chunk_overlap);
        if pieces.is_empty() {
            return Err(PipelineError::NoChunks(version.as_str()));
        }

        let vectors = embed(
            self.embedder.as_ref(),
            &self.settings.prefixes,
            &pieces,
            EmbeddingRole::Document,
        )
        .await
        .map_err(|source| PipelineError::Embedding {
            target: version.as_str(),
            source,
        })?;

        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (text, embedding))| Chunk {
                index,
                text,
                embedding,
            })
            .collect();
        tracing::debug!(version = version.as_str(), chunks = chunks.len(), "document embedded");

        Ok(DocumentVersion {
            version,
            text,
            chunks,
        })
    }

    /// Load and embed all comments in one query-role batch.
    async fn process_comments(&self, path: &Path) -> Result<Vec<Comment>, PipelineError> {
        let lines =
            load_comments(path).map_err(|e| PipelineError::CommentsUnreadable(format!("{:#}", e)))?;
        if lines.is_empty() {
            return Err(PipelineError::NoComments);
        }

        let texts: Vec<String> = lines.iter().map(|c| c.text.clone()).collect();
        let vectors = embed(
            self.embedder.as_ref(),
            &self.settings.prefixes,
            &texts,
            EmbeddingRole::Query,
        )
        .await
        .map_err(|source| PipelineError::Embedding {
            target: "comments",
            source,
        })?;

        Ok(lines
            .into_iter()
            .zip(vectors)
            .map(|(line, embedding)| Comment {
                id: line.id,
                text: line.text,
                embedding,
            })
            .collect())
    }

    fn enter(&self, task_id: &str, stage: Stage) {
        self.registry.update(task_id, |t| {
            t.stage = stage;
            t.comment_progress = None;
        });
        self.progress.report(ProgressEvent::Stage {
            task_id: task_id.to_string(),
            stage,
        });
    }

    fn set_comment_progress(&self, task_id: &str, n: usize, total: usize) {
        self.registry.update(task_id, |t| {
            t.comment_progress = Some(format!("{}/{}", n, total));
        });
        self.progress.report(ProgressEvent::Comment {
            task_id: task_id.to_string(),
            n,
            total,
        });
    }

    /// Drop whatever collections a failed task created.
    async fn discard_collections(&self, task_id: &str) {
        let Some(task) = self.registry.get(task_id) else {
            return;
        };
        for collection in &task.collections {
            if let Err(e) = self.index.drop_collection(collection).await {
                tracing::warn!(task_id, collection = %collection, error = %e, "failed to drop collection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name_is_v1_stem() {
        let request = AnalysisRequest::from_paths(
            Path::new("/tmp/up/v1_contract.final.pdf"),
            Path::new("/tmp/up/v2_contract.pdf"),
            Path::new("/tmp/up/comments.txt"),
        );
        assert_eq!(request.doc_v1_name, "v1_contract.final.pdf");
        assert_eq!(request.base_name(), "v1_contract.final");
    }

    #[test]
    fn test_base_name_fallback() {
        let mut request = AnalysisRequest::from_paths(
            Path::new("a.txt"),
            Path::new("b.txt"),
            Path::new("c.txt"),
        );
        request.doc_v1_name = String::new();
        assert_eq!(request.base_name(), "document");
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            PipelineError::NoComments.to_string(),
            "no comments found in the comments file"
        );
        assert_eq!(
            PipelineError::NoChunks("v2").to_string(),
            "document v2 produced no text chunks"
        );
        let e = PipelineError::Index(IndexError::UnknownCollection("c".to_string()));
        assert_eq!(e.to_string(), "vector index error: collection not found: c");
    }
}
