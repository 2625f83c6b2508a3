//! # Redline
//!
//! Decides, for every reviewer comment made on one version of a document,
//! whether the next version addressed it.
//!
//! Both versions are split into overlapping chunks, embedded and written to
//! task-scoped vector collections. Each comment is embedded as a query, the
//! top-k chunks from each version are retrieved, and a completion model
//! returns a JSON verdict that is parsed defensively into an
//! [`AnalysisResult`](redline_core::models::AnalysisResult).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │ v1 / v2 docs │──▶│ Extract+Chunk │──▶│ Vector index │
//! │   comments   │   │    +Embed     │   │ (per task)   │
//! └──────────────┘   └───────────────┘   └──────┬───────┘
//!                                               │ top-k
//!                                               ▼
//!                    ┌──────────┐         ┌────────────┐
//!                    │  Report  │◀────────│ Classifier │
//!                    │   JSON   │         │   (LLM)    │
//!                    └──────────┘         └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | Text extraction from txt/md/pdf/docx |
//! | [`comments`] | Comments file loading |
//! | [`embedding`] | Embedding providers (OpenAI-compatible, Ollama, local) |
//! | [`index`] | Vector index backends (in-memory, Qdrant) |
//! | [`llm`] | Completion-service client |
//! | [`classifier`] | Per-comment verdicts |
//! | [`tasks`] | Shared task registry |
//! | [`report`] | Report persistence and retention |
//! | [`progress`] | Stage progress reporters |
//! | [`pipeline`] | Stage orchestration |
//! | [`server`] | HTTP API |
//!
//! Chunking, the data model, the index trait and verdict parsing live in
//! the [`redline_core`] crate.

pub mod classifier;
pub mod comments;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod llm;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod server;
pub mod tasks;
