//! Per-task stage progress reporting.
//!
//! The pipeline reports every stage transition and every classified
//! comment through a [`ProgressReporter`], so `redline analyze` can show
//! what it is doing. Progress goes to **stderr** so stdout stays parseable.
//! The task registry is updated regardless of which reporter is used.

use std::io::Write;

use redline_core::models::Stage;

/// A single progress event for one task.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// The task entered a new stage.
    Stage { task_id: String, stage: Stage },
    /// `n` of `total` comments have been classified.
    Comment {
        task_id: String,
        n: usize,
        total: usize,
    },
}

/// Reports task progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: `task_…  [ 80%] analyzing_comments  2 / 5`.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Stage { task_id, stage } => {
                format!("{}  [{:>3}%] {}\n", task_id, stage.percent(), stage.as_str())
            }
            ProgressEvent::Comment { task_id, n, total } => {
                format!(
                    "{}  [{:>3}%] {}  {} / {} comments\n",
                    task_id,
                    Stage::AnalyzingComments.percent(),
                    Stage::AnalyzingComments.as_str(),
                    n,
                    total
                )
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Stage { task_id, stage } => serde_json::json!({
                "event": "stage",
                "task_id": task_id,
                "stage": stage.as_str(),
                "percent": stage.percent(),
            }),
            ProgressEvent::Comment { task_id, n, total } => serde_json::json!({
                "event": "comment",
                "task_id": task_id,
                "n": n,
                "total": total,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
