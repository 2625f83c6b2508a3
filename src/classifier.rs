//! Per-comment verdicts from retrieved evidence.

use anyhow::Result;
use std::sync::Arc;

use redline_core::models::{AnalysisResult, Comment, SearchHit};
use redline_core::verdict;

use crate::llm::CompletionClient;

/// Judges whether one comment was addressed, given top-k evidence from
/// each document version.
pub struct CommentClassifier {
    client: Arc<dyn CompletionClient>,
}

impl CommentClassifier {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Build the prompt, call the completion service and parse its reply.
    ///
    /// Only a failed completion call is an error. Empty or malformed output
    /// becomes an `error`-status result.
    pub async fn classify(
        &self,
        comment: &Comment,
        v1_evidence: &[SearchHit],
        v2_evidence: &[SearchHit],
    ) -> Result<AnalysisResult> {
        let prompt = verdict::build_prompt(&comment.text, v1_evidence, v2_evidence);
        let raw = self.client.complete(&prompt).await?;
        let result = verdict::parse_completion(&comment.id, &comment.text, &raw);
        if result.status.is_error() {
            tracing::warn!(
                comment_id = %comment.id,
                reason = %result.explanation,
                "unusable completion output"
            );
        }
        Ok(result)
    }
}
