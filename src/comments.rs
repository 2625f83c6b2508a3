//! Reviewer comment loading.
//!
//! The comments file is free text with one comment per line. Lines are
//! trimmed and blank lines skipped; each remaining line becomes a comment
//! with id `C<n>`, `n` counting non-blank lines from 1.

use anyhow::{Context, Result};
use std::path::Path;

use redline_core::models::CommentLine;

/// Read and parse a comments file.
pub fn load_comments(path: &Path) -> Result<Vec<CommentLine>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read comments file: {}", path.display()))?;
    let text = String::from_utf8(bytes)
        .with_context(|| format!("Comments file is not valid UTF-8: {}", path.display()))?;
    Ok(parse_comments(&text))
}

/// Split comment text into numbered comments.
pub fn parse_comments(text: &str) -> Vec<CommentLine> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, line)| CommentLine {
            id: format!("C{}", i + 1),
            text: line.to_string(),
        })
        .collect()
}
