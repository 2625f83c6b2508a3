//! HTTP API for submitting analyses and polling their progress.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/analyze` | Multipart upload of `doc_v1`, `doc_v2` and `comments`; returns a task id |
//! | `GET`  | `/status/{task_id}` | Current stage, progress and error of a task |
//! | `GET`  | `/results/{task_id}` | The report array, once the task is `completed` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "unknown task: task_0f3c…" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `not_ready` (404,
//! task still running), `internal` (500).
//!
//! Completed reports are reloaded from `storage.results_dir` at startup, and
//! a background sweep evicts expired tasks every `server.sweep_interval_secs`.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use redline_core::models::{AnalysisResult, ReportSummary, Task, TaskStatus};

use crate::config::Config;
use crate::pipeline::{AnalysisRequest, Pipeline};
use crate::tasks::TaskRegistry;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Root under which each task's uploads are staged in `<task_id>/`.
    pub uploads_dir: PathBuf,
}

/// Starts the HTTP server on `[server].bind` and runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let registry = Arc::new(TaskRegistry::new());
    let pipeline = Arc::new(Pipeline::from_config(config, registry.clone())?);

    tokio::fs::create_dir_all(&config.storage.uploads_dir).await?;
    tokio::fs::create_dir_all(&config.storage.results_dir).await?;

    if let Some(reports) = pipeline.reports() {
        let restored = reports.load_all()?;
        tracing::info!(count = restored.len(), "loaded existing results from disk");
        for task in restored {
            registry.insert(task);
        }
    }

    let state = AppState {
        pipeline: pipeline.clone(),
        uploads_dir: config.storage.uploads_dir.clone(),
    };

    spawn_sweeper(
        state.clone(),
        config.storage.retention(),
        Duration::from_secs(config.server.sweep_interval_secs.max(1)),
    );

    let app = router(state, config.server.max_upload_bytes);

    tracing::info!(
        bind = %config.server.bind,
        llm = %config.llm.url,
        embedding = %config.embedding.provider,
        index = %config.index.backend,
        "redline server listening"
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router. Exposed so tests can drive it without a socket.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/analyze", post(handle_analyze))
        .route("/status/{task_id}", get(handle_status))
        .route("/results/{task_id}", get(handle_results))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the retention sweep once immediately and then on every tick.
fn spawn_sweeper(state: AppState, retention: Duration, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let evicted = state.pipeline.sweep(retention).await;
            for task in evicted {
                let dir = state.uploads_dir.join(&task.id);
                if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(task_id = %task.id, error = %e, "failed to remove uploads");
                    }
                }
            }
        }
    });
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// 404 with its own code: the task exists but has no report yet.
fn not_ready(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_ready".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /analyze ============

#[derive(Serialize)]
struct AnalyzeResponse {
    task_id: String,
    status: TaskStatus,
}

/// One uploaded file held in memory until the task directory exists.
struct Upload {
    file_name: String,
    data: axum::body::Bytes,
}

/// Keep only the final path component of a client-supplied file name.
fn safe_file_name(raw: &str, fallback: &str) -> String {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if name.is_empty() || name == "." || name == ".." {
        fallback.to_string()
    } else {
        name.to_string()
    }
}

/// Handler for `POST /analyze`.
///
/// Reads the three multipart files, stages them under
/// `<uploads_dir>/<task_id>/` and starts the task. Returns as soon as the
/// task is running; progress is polled through `/status/{task_id}`.
async fn handle_analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let mut doc_v1: Option<Upload> = None;
    let mut doc_v2: Option<Upload> = None;
    let mut comments: Option<Upload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let slot = match name.as_str() {
            "doc_v1" => &mut doc_v1,
            "doc_v2" => &mut doc_v2,
            "comments" => &mut comments,
            _ => continue,
        };
        let file_name = safe_file_name(field.file_name().unwrap_or(""), &name);
        let data = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read field {}: {}", name, e)))?;
        *slot = Some(Upload { file_name, data });
    }

    let doc_v1 = doc_v1.ok_or_else(|| bad_request("missing multipart field: doc_v1"))?;
    let doc_v2 = doc_v2.ok_or_else(|| bad_request("missing multipart field: doc_v2"))?;
    let comments = comments.ok_or_else(|| bad_request("missing multipart field: comments"))?;

    let pipeline = &state.pipeline;
    let task_id = pipeline.create_task(&doc_v1.file_name, &doc_v2.file_name, &comments.file_name);

    let task_dir = state.uploads_dir.join(&task_id);
    let staged = [
        (task_dir.join(format!("v1_{}", doc_v1.file_name)), &doc_v1),
        (task_dir.join(format!("v2_{}", doc_v2.file_name)), &doc_v2),
        (task_dir.join(format!("comments_{}", comments.file_name)), &comments),
    ];

    if let Err(e) = stage_files(&task_dir, &staged).await {
        let _ = tokio::fs::remove_dir_all(&task_dir).await;
        let message = format!("failed to save uploaded files: {}", e);
        pipeline.fail(&task_id, &message);
        return Err(internal(message));
    }

    let [(v1_path, _), (v2_path, _), (comments_path, _)] = staged;
    let request = AnalysisRequest {
        doc_v1: v1_path,
        doc_v2: v2_path,
        comments: comments_path,
        doc_v1_name: doc_v1.file_name.clone(),
        doc_v2_name: doc_v2.file_name.clone(),
        comments_name: comments.file_name.clone(),
    };
    pipeline.spawn(task_id.clone(), request);

    Ok(Json(AnalyzeResponse {
        task_id,
        status: TaskStatus::Processing,
    }))
}

async fn stage_files(dir: &std::path::Path, files: &[(PathBuf, &Upload)]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    for (path, upload) in files {
        tokio::fs::write(path, &upload.data).await?;
    }
    Ok(())
}

// ============ GET /status/{task_id} ============

/// JSON response body for `GET /status/{task_id}`.
#[derive(Serialize)]
pub struct StatusResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub stage: &'static str,
    pub percent: u8,
    pub comment_progress: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub doc_v1: String,
    pub doc_v2: String,
    pub comments: String,
    /// Verdict counts, present once the task has completed.
    pub summary: Option<ReportSummary>,
}

impl From<&Task> for StatusResponse {
    fn from(task: &Task) -> Self {
        StatusResponse {
            task_id: task.id.clone(),
            status: task.status,
            stage: task.stage.as_str(),
            percent: task.stage.percent(),
            comment_progress: task.comment_progress.clone(),
            error: task.error.clone(),
            created_at: task.created_at,
            completed_at: task.completed_at,
            doc_v1: task.doc_v1.clone(),
            doc_v2: task.doc_v2.clone(),
            comments: task.comments.clone(),
            summary: task.report.as_deref().map(ReportSummary::from_results),
        }
    }
}

async fn handle_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let task = state
        .pipeline
        .registry()
        .get(&task_id)
        .ok_or_else(|| not_found(format!("unknown task: {}", task_id)))?;
    Ok(Json(StatusResponse::from(&task)))
}

// ============ GET /results/{task_id} ============

async fn handle_results(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Vec<AnalysisResult>>, AppError> {
    let task = state
        .pipeline
        .registry()
        .get(&task_id)
        .ok_or_else(|| not_found(format!("unknown task: {}", task_id)))?;

    match (task.status, task.report) {
        (TaskStatus::Completed, Some(report)) => Ok(Json(report)),
        (TaskStatus::Error, _) => Err(not_found(format!(
            "task {} failed: {}",
            task_id,
            task.error.unwrap_or_default()
        ))),
        _ => Err(not_ready(format!(
            "task {} is still {}",
            task_id,
            task.stage.as_str()
        ))),
    }
}
