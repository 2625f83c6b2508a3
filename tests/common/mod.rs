//! Deterministic stand-ins for the embedding model and completion service.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use redline::llm::CompletionClient;
use redline::pipeline::{Pipeline, PipelineSettings};
use redline::progress::{ProgressEvent, ProgressReporter};
use redline::tasks::TaskRegistry;
use redline_core::embedding::{EmbeddingError, EmbeddingProvider, RolePrefixes};
use redline_core::index::memory::InMemoryIndex;
use redline_core::index::Distance;
use redline_core::models::Task;

pub const DIMS: usize = 512;

// ─── Bag-of-words embedder ──────────────────────────────────────────

/// Hashes lowercase words into a fixed number of buckets. Role prefixes
/// are stripped before hashing but every raw input is recorded.
#[derive(Default)]
pub struct BagOfWords {
    pub seen: Mutex<Vec<String>>,
}

impl BagOfWords {
    pub fn vector(text: &str) -> Vec<f32> {
        let prefixes = RolePrefixes::default();
        let body = text
            .strip_prefix(prefixes.document.as_str())
            .or_else(|| text.strip_prefix(prefixes.query.as_str()))
            .unwrap_or(text);
        let mut v = vec![0.0f32; DIMS];
        for word in body
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hash: u64 = 0xcbf29ce484222325;
            for b in word.to_lowercase().bytes() {
                hash ^= b as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            v[(hash % DIMS as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.seen.lock().unwrap().extend(texts.iter().cloned());
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Embedder that always fails.
pub struct BrokenEmbedder;

#[async_trait]
impl EmbeddingProvider for BrokenEmbedder {
    fn model_name(&self) -> &str {
        "broken"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Model("model server unavailable".to_string()))
    }
}

/// Embedder that panics mid-run.
pub struct PanickingEmbedder;

#[async_trait]
impl EmbeddingProvider for PanickingEmbedder {
    fn model_name(&self) -> &str {
        "panicking"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        panic!("embedding runtime crashed");
    }
}

// ─── Event journal ──────────────────────────────────────────────────

/// Shared, ordered log of progress events and embedding calls. Each stage
/// entry also notes whether the registry already showed that stage when
/// the event was reported.
pub struct Journal {
    pub entries: Mutex<Vec<String>>,
    registry: Arc<TaskRegistry>,
}

impl Journal {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            registry,
        }
    }

    pub fn push(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

impl ProgressReporter for Journal {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Stage { task_id, stage } => {
                let current = self.registry.get(&task_id).map(|t| t.stage);
                if current == Some(stage) {
                    self.push(stage.as_str().to_string());
                } else {
                    self.push(format!("{} (registry: {:?})", stage.as_str(), current));
                }
            }
            ProgressEvent::Comment { task_id, n, total } => {
                let counter = format!("{}/{}", n, total);
                let current = self.registry.get(&task_id).and_then(|t| t.comment_progress);
                if current.as_deref() == Some(counter.as_str()) {
                    self.push(counter);
                } else {
                    self.push(format!("{} (registry: {:?})", counter, current));
                }
            }
        }
    }
}

/// Bag-of-words embedder that writes `embed` to the journal on every call.
pub struct JournaledEmbedder {
    inner: BagOfWords,
    journal: Arc<Journal>,
}

#[async_trait]
impl EmbeddingProvider for JournaledEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.journal.push("embed".to_string());
        self.inner.embed_batch(texts).await
    }
}

// ─── Scripted completion client ─────────────────────────────────────

/// What the judge does when a comment contains a trigger phrase.
#[derive(Clone)]
pub enum Reply {
    /// Echo the retrieved evidence back in a valid verdict with this status.
    Verdict(&'static str),
    /// Return this raw text verbatim.
    Raw(&'static str),
    /// Fail the request.
    Fail,
}

/// Answers each prompt by echoing the evidence sections it was given, so
/// tests can check what retrieval produced.
pub struct EchoJudge {
    rules: Vec<(&'static str, Reply)>,
    default: Reply,
    pub prompts: Mutex<Vec<String>>,
    delay: Duration,
}

impl EchoJudge {
    pub fn new(default: Reply) -> Self {
        Self {
            rules: Vec::new(),
            default,
            prompts: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn when(mut self, trigger: &'static str, reply: Reply) -> Self {
        self.rules.push((trigger, reply));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Text between `start` and `end` markers of a prompt.
fn section<'a>(prompt: &'a str, start: &str, end: &str) -> &'a str {
    let from = prompt.find(start).map(|i| i + start.len()).unwrap_or(0);
    let rest = &prompt[from..];
    let to = rest.find(end).unwrap_or(rest.len());
    rest[..to].trim()
}

#[async_trait]
impl CompletionClient for EchoJudge {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let comment = section(prompt, "Comment:\n", "\n\nRelevant text from VERSION 1");
        let reply = self
            .rules
            .iter()
            .find(|(trigger, _)| comment.contains(trigger))
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| self.default.clone());

        match reply {
            Reply::Verdict(status) => {
                let v1 = section(
                    prompt,
                    "VERSION 1 of the document:\n",
                    "\n\nRelevant text from VERSION 2",
                );
                let v2 = section(prompt, "VERSION 2 of the document:\n", "\n\nBased ONLY");
                let body = serde_json::json!({
                    "explanation": format!("Judged: {}", comment),
                    "evidence_v1": v1,
                    "evidence_v2": v2,
                    "suggestion": "",
                    "status": status,
                });
                Ok(format!("Here is my verdict:\n{}\nThanks.", body))
            }
            Reply::Raw(text) => Ok(text.to_string()),
            Reply::Fail => anyhow::bail!("completion service connection refused"),
        }
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

pub struct Harness {
    pub embedder: Arc<BagOfWords>,
    pub index: Arc<InMemoryIndex>,
    pub judge: Arc<EchoJudge>,
    pub registry: Arc<TaskRegistry>,
    pub pipeline: Arc<Pipeline>,
}

pub fn harness(settings: PipelineSettings, judge: EchoJudge) -> Harness {
    let embedder = Arc::new(BagOfWords::default());
    let index = Arc::new(InMemoryIndex::new(DIMS, Distance::Cosine));
    let judge = Arc::new(judge);
    let registry = Arc::new(TaskRegistry::new());
    let pipeline = Arc::new(Pipeline::new(
        settings,
        embedder.clone(),
        index.clone(),
        judge.clone(),
        registry.clone(),
    ));
    Harness {
        embedder,
        index,
        judge,
        registry,
        pipeline,
    }
}

/// A pipeline whose progress events and embedding calls land in one journal.
pub fn journaled(settings: PipelineSettings, judge: EchoJudge) -> (Arc<Pipeline>, Arc<Journal>) {
    let registry = Arc::new(TaskRegistry::new());
    let journal = Arc::new(Journal::new(registry.clone()));
    let embedder = Arc::new(JournaledEmbedder {
        inner: BagOfWords::default(),
        journal: journal.clone(),
    });
    let pipeline = Pipeline::new(
        settings,
        embedder,
        Arc::new(InMemoryIndex::new(DIMS, Distance::Cosine)),
        Arc::new(judge),
        registry,
    )
    .with_progress(journal.clone());
    (Arc::new(pipeline), journal)
}

pub fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Poll until the task is terminal or five seconds pass.
pub async fn wait_terminal(registry: &TaskRegistry, task_id: &str) -> Task {
    for _ in 0..500 {
        if let Some(task) = registry.get(task_id) {
            if task.is_terminal() {
                return task;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {} did not finish", task_id);
}

pub const CONTRACT_V1: &str = "The supplier shall deliver the goods within thirty days. \
Payment is due upon receipt of invoice. \
The warranty period is twelve months from delivery.";

pub const CONTRACT_V2: &str = "The supplier shall deliver the goods within fourteen days. \
Payment is due within sixty days of invoice. \
The warranty period is twelve months from delivery.";

pub const REVIEW: &str = "Shorten the delivery deadline for the goods\n\
\n\
Extend the payment terms beyond receipt of invoice\n\
The warranty period is twelve months from delivery\n";
