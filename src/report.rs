//! Persisted reports.
//!
//! A finished task's report is written as a pretty-printed JSON array to
//! `<results_dir>/results_<task_id>.json`. On startup the server reloads
//! these files so completed results survive a restart, and the retention
//! sweep deletes files older than the configured period.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use redline_core::models::{AnalysisResult, Stage, Task, TaskStatus};

const FILE_PREFIX: &str = "results_";
const FILE_SUFFIX: &str = ".json";

#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, task_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", FILE_PREFIX, task_id, FILE_SUFFIX))
    }

    /// Write a report and return the file path.
    pub fn save(&self, task_id: &str, results: &[AnalysisResult]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create results directory: {}", self.dir.display())
        })?;
        let path = self.path_for(task_id);
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        Ok(path)
    }

    /// Read back one report.
    pub fn load(&self, task_id: &str) -> Result<Vec<AnalysisResult>> {
        let path = self.path_for(task_id);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read report: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse report: {}", path.display()))
    }

    /// Rebuild completed task records from every report on disk.
    ///
    /// Unreadable files are skipped with a warning. Timestamps come from
    /// the file's modification time.
    pub fn load_all(&self) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        for (task_id, path, modified) in self.report_files()? {
            let results = match self.load(&task_id) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %format!("{:#}", e), "skipping unreadable report");
                    continue;
                }
            };
            let at: DateTime<Utc> = modified.into();
            let mut task = Task::new(task_id, "", "", "");
            task.status = TaskStatus::Completed;
            task.stage = Stage::Completed;
            task.created_at = at;
            task.completed_at = Some(at);
            task.report = Some(results);
            task.report_path = Some(path.display().to_string());
            tasks.push(task);
        }
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    /// Delete reports last modified more than `retention` ago and return
    /// the task ids they belonged to. A report that cannot be deleted is
    /// logged and skipped.
    pub fn cleanup(&self, retention: Duration) -> Result<Vec<String>> {
        Ok(remove_expired(self.report_files()?, retention, SystemTime::now()))
    }

    fn report_files(&self) -> Result<Vec<(String, PathBuf, SystemTime)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list results directory: {}", self.dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(task_id) = name
                .to_str()
                .and_then(|n| n.strip_prefix(FILE_PREFIX))
                .and_then(|n| n.strip_suffix(FILE_SUFFIX))
            else {
                continue;
            };
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or_else(|_| SystemTime::now());
            files.push((task_id.to_string(), entry.path(), modified));
        }
        Ok(files)
    }
}

fn remove_expired(
    files: Vec<(String, PathBuf, SystemTime)>,
    retention: Duration,
    now: SystemTime,
) -> Vec<String> {
    let mut removed = Vec::new();
    for (task_id, path, modified) in files {
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= retention {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(task_id = %task_id, "deleted expired report");
                removed.push(task_id);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to delete expired report");
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use redline_core::models::Status;
    use tempfile::TempDir;

    fn result(id: &str) -> AnalysisResult {
        AnalysisResult {
            comment_id: id.to_string(),
            comment_text: "Fix numbering".to_string(),
            status: Status::PartiallyAddressed,
            explanation: "Mostly".to_string(),
            evidence_v1: "1, 1, 2".to_string(),
            evidence_v2: "1, 2, 2".to_string(),
            suggestion: "Renumber 3".to_string(),
        }
    }

    #[test]
    fn test_save_writes_named_json_array() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path().join("results"));
        let path = store.save("task_abc", &[result("C1"), result("C2")]).unwrap();

        assert_eq!(path.file_name().unwrap(), "results_task_abc.json");
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0]["status"], "partially_addressed");
        assert_eq!(store.load("task_abc").unwrap()[1].comment_id, "C2");
    }

    #[test]
    fn test_load_all_restores_completed_tasks() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path());
        store.save("task_1", &[result("C1")]).unwrap();
        std::fs::write(tmp.path().join("results_broken.json"), "not json").unwrap();
        std::fs::write(tmp.path().join("unrelated.json"), "[]").unwrap();

        let tasks = store.load_all().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "task_1");
        assert_eq!(tasks[0].status, TaskStatus::Completed);
        assert_eq!(tasks[0].report.as_ref().unwrap().len(), 1);
        assert!(tasks[0].completed_at.is_some());
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path().join("nope"));
        assert!(store.load_all().unwrap().is_empty());
        assert!(store.cleanup(Duration::ZERO).unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_respects_retention() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path());
        store.save("task_1", &[result("C1")]).unwrap();

        assert!(store.cleanup(Duration::from_secs(3600)).unwrap().is_empty());
        std::thread::sleep(Duration::from_millis(20));
        let removed = store.cleanup(Duration::from_millis(1)).unwrap();
        assert_eq!(removed, vec!["task_1".to_string()]);
        assert!(!store.path_for("task_1").exists());
    }

    #[test]
    fn test_cleanup_continues_past_failed_delete() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path());
        store.save("task_2", &[result("C1")]).unwrap();

        let old = SystemTime::UNIX_EPOCH;
        let files = vec![
            ("task_1".to_string(), store.path_for("task_1"), old),
            ("task_2".to_string(), store.path_for("task_2"), old),
        ];
        let removed = remove_expired(files, Duration::from_secs(60), SystemTime::now());
        assert_eq!(removed, vec!["task_2".to_string()]);
        assert!(!store.path_for("task_2").exists());
    }
}
