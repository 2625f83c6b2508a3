//! Shared registry of analysis tasks.
//!
//! Every task's background run and every status query go through one
//! [`TaskRegistry`]. Updates replace the whole record under the write lock,
//! so a reader never sees a half-applied change. Records that reached a
//! terminal state are frozen.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use redline_core::models::Task;

#[derive(Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new task in `processing` / `uploading`.
    pub fn create(&self, id: &str, doc_v1: &str, doc_v2: &str, comments: &str) -> Task {
        let task = Task::new(id.to_string(), doc_v1, doc_v2, comments);
        self.tasks
            .write()
            .unwrap()
            .insert(id.to_string(), task.clone());
        task
    }

    /// Snapshot of a task.
    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.read().unwrap().get(id).cloned()
    }

    /// Apply `f` to a copy of the record and store the copy.
    ///
    /// Returns `false` without calling `f` if the task is unknown or already
    /// terminal.
    pub fn update<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Task),
    {
        let mut tasks = self.tasks.write().unwrap();
        let Some(current) = tasks.get(id) else {
            return false;
        };
        if current.is_terminal() {
            return false;
        }
        let mut next = current.clone();
        f(&mut next);
        tasks.insert(id.to_string(), next);
        true
    }

    /// Put a record in as-is, replacing any existing one. Used when
    /// restoring persisted reports.
    pub fn insert(&self, task: Task) {
        self.tasks.write().unwrap().insert(task.id.clone(), task);
    }

    pub fn remove(&self, id: &str) -> Option<Task> {
        self.tasks.write().unwrap().remove(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove terminal tasks whose age exceeds `max_age` and return them.
    ///
    /// Age counts from `completed_at`, falling back to `created_at`.
    pub fn evict_older_than(&self, max_age: Duration) -> Vec<Task> {
        self.evict_older_than_at(max_age, Utc::now())
    }

    fn evict_older_than_at(&self, max_age: Duration, now: DateTime<Utc>) -> Vec<Task> {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let mut tasks = self.tasks.write().unwrap();
        let expired: Vec<String> = tasks
            .values()
            .filter(|t| t.is_terminal())
            .filter(|t| {
                let since = t.completed_at.unwrap_or(t.created_at);
                now.signed_duration_since(since) > max_age
            })
            .map(|t| t.id.clone())
            .collect();
        expired
            .iter()
            .filter_map(|id| tasks.remove(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redline_core::models::{Stage, TaskStatus};

    #[test]
    fn test_create_and_get() {
        let registry = TaskRegistry::new();
        registry.create("t1", "a.txt", "b.txt", "c.txt");
        let task = registry.get("t1").unwrap();
        assert_eq!(task.status, TaskStatus::Processing);
        assert_eq!(task.stage, Stage::Uploading);
        assert_eq!(task.doc_v2, "b.txt");
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn test_update_replaces_record() {
        let registry = TaskRegistry::new();
        registry.create("t1", "a", "b", "c");
        assert!(registry.update("t1", |t| {
            t.stage = Stage::AnalyzingComments;
            t.comment_progress = Some("1/3".to_string());
        }));
        let task = registry.get("t1").unwrap();
        assert_eq!(task.stage, Stage::AnalyzingComments);
        assert_eq!(task.comment_progress.as_deref(), Some("1/3"));
    }

    #[test]
    fn test_terminal_tasks_are_frozen() {
        let registry = TaskRegistry::new();
        registry.create("t1", "a", "b", "c");
        registry.update("t1", |t| {
            t.status = TaskStatus::Error;
            t.stage = Stage::Error;
            t.error = Some("boom".to_string());
        });
        assert!(!registry.update("t1", |t| t.stage = Stage::Completed));
        assert_eq!(registry.get("t1").unwrap().stage, Stage::Error);
        assert!(!registry.update("missing", |_| {}));
    }

    #[test]
    fn test_eviction_only_takes_old_terminal_tasks() {
        let registry = TaskRegistry::new();
        let now = Utc::now();
        let old = now - chrono::Duration::days(10);

        let mut done_old = Task::new("old".to_string(), "a", "b", "c");
        done_old.status = TaskStatus::Completed;
        done_old.completed_at = Some(old);
        registry.insert(done_old);

        let mut done_new = Task::new("new".to_string(), "a", "b", "c");
        done_new.status = TaskStatus::Completed;
        done_new.completed_at = Some(now);
        registry.insert(done_new);

        let mut running_old = Task::new("running".to_string(), "a", "b", "c");
        running_old.created_at = old;
        registry.insert(running_old);

        let evicted = registry.evict_older_than_at(Duration::from_secs(7 * 86_400), now);
        let ids: Vec<&str> = evicted.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["old"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.get("running").is_some());
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let registry = std::sync::Arc::new(TaskRegistry::new());
        registry.create("t", "a", "b", "c");
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry.update("t", |t| t.collections.push(format!("c{}", i)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.get("t").unwrap().collections.len(), 800);
    }
}
