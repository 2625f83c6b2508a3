//! # Redline Core
//!
//! Shared logic for Redline: the typed data model, the overlapping-window
//! chunker, the embedding seam, the vector index abstraction and the
//! verdict prompt/parse boundary.
//!
//! This crate contains no tokio runtime, HTTP clients or filesystem I/O.
//! Concrete providers (HTTP embedders, Qdrant, the completion service) live
//! in the `redline` app crate and plug in through the traits defined here.

pub mod chunk;
pub mod embedding;
pub mod index;
pub mod models;
pub mod verdict;
