//! Judgment prompt construction and completion-output parsing.
//!
//! The completion service is asked for exactly one JSON object with five
//! string fields. Its output is never trusted verbatim:
//!
//! 1. Empty output becomes an `error` verdict.
//! 2. The candidate JSON is the slice from the first `{` to the last `}`,
//!    so conversational text around the object is tolerated.
//! 3. The candidate is parsed strictly. A missing field is replaced by a
//!    fixed placeholder; anything that is not a JSON object, or a `status`
//!    outside the allowed literals, becomes an `error` verdict carrying the
//!    candidate text in `evidence_v1`.
//!
//! Parsing never fails: every path yields an [`AnalysisResult`].

use serde_json::{Map, Value};

use crate::models::{AnalysisResult, SearchHit, Status};

/// Wire literal for [`Status::Addressed`].
pub const STATUS_ADDRESSED: &str = "addressed";
/// Wire literal for [`Status::PartiallyAddressed`].
pub const STATUS_PARTIALLY_ADDRESSED: &str = "partially addressed";
/// Wire literal for [`Status::NotAddressed`].
pub const STATUS_NOT_ADDRESSED: &str = "not addressed";

pub const NO_EXPLANATION: &str = "No explanation provided";
pub const NO_EVIDENCE: &str = "No evidence provided";

/// Render retrieved hits as `Chunk <rank>:\n<text>` blocks, best first.
pub fn format_evidence(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, h)| format!("Chunk {}:\n{}", i + 1, h.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the single judgment prompt for one comment.
pub fn build_prompt(comment: &str, v1_hits: &[SearchHit], v2_hits: &[SearchHit]) -> String {
    format!(
        r#"You are an expert document analyst. Determine if a comment made on an earlier document version was addressed in a newer version.

Comment:
{comment}

Relevant text from VERSION 1 of the document:
{v1}

Relevant text from VERSION 2 of the document:
{v2}

Based ONLY on the provided texts, determine if the comment was addressed in version 2.
Your response MUST be ONLY a single, valid JSON object. Do NOT include ```json markers, introductory sentences, or any text outside the JSON object itself.
Strictly adhere to JSON syntax: use double quotes ("") for all keys and all string values.

The JSON object MUST contain these fields, all with string values:
- "explanation": Detailed explanation of whether and how the comment was addressed.
- "evidence_v1": Relevant evidence text from version 1.
- "evidence_v2": Relevant evidence text from version 2 showing if/how the comment was addressed.
- "suggestion": Suggestion for further improvements if needed (empty string if none).
- "status": Exactly one of: "{addressed}", "{partial}", "{not_addressed}".

Example of the required EXACT output format:
{{
  "explanation": "The comment was fully addressed by adding the new section 3.2.",
  "evidence_v1": "Section 3 is missing.",
  "evidence_v2": "Section 3.2: Description of the new feature.",
  "suggestion": "",
  "status": "{addressed}"
}}

Now, generate the JSON object for the provided comment and texts. Respond ONLY with the JSON object.
"#,
        comment = comment,
        v1 = format_evidence(v1_hits),
        v2 = format_evidence(v2_hits),
        addressed = STATUS_ADDRESSED,
        partial = STATUS_PARTIALLY_ADDRESSED,
        not_addressed = STATUS_NOT_ADDRESSED,
    )
}

/// Map a status literal to a [`Status`]. Accepts the wire literals, their
/// snake_case forms and the legacy Russian literals, case-insensitively.
/// `error` is never accepted from the model.
pub fn parse_status(raw: &str) -> Option<Status> {
    let normalized = raw.trim().to_lowercase().replace('_', " ");
    match normalized.as_str() {
        "addressed" | "учтен" => Some(Status::Addressed),
        "partially addressed" | "частично учтен" => Some(Status::PartiallyAddressed),
        "not addressed" | "не учтен" => Some(Status::NotAddressed),
        _ => None,
    }
}

/// Slice from the first `{` to the last `}` (inclusive), or the whole
/// trimmed text when there is no such pair.
pub fn extract_candidate(raw: &str) -> &str {
    let trimmed = raw.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(first), Some(last)) if first < last => &trimmed[first..=last],
        _ => trimmed,
    }
}

/// Turn raw completion output into a verdict for one comment.
pub fn parse_completion(comment_id: &str, comment_text: &str, raw: &str) -> AnalysisResult {
    if raw.trim().is_empty() {
        return error_result(
            comment_id,
            comment_text,
            "Error analyzing comment: the completion service returned an empty response",
            "",
        );
    }

    let candidate = extract_candidate(raw);
    let object = match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            return error_result(
                comment_id,
                comment_text,
                &format!(
                    "Error analyzing comment: expected a JSON object, got {}",
                    json_kind(&other)
                ),
                candidate,
            )
        }
        Err(e) => {
            return error_result(
                comment_id,
                comment_text,
                &format!("Error analyzing comment: invalid JSON in response: {}", e),
                candidate,
            )
        }
    };

    let status = match field(&object, "status") {
        None => Status::NotAddressed,
        Some(s) => match parse_status(&s) {
            Some(status) => status,
            None => {
                return error_result(
                    comment_id,
                    comment_text,
                    &format!("Error analyzing comment: unrecognized status {:?}", s),
                    candidate,
                )
            }
        },
    };

    AnalysisResult {
        comment_id: comment_id.to_string(),
        comment_text: comment_text.to_string(),
        status,
        explanation: field(&object, "explanation").unwrap_or_else(|| NO_EXPLANATION.to_string()),
        evidence_v1: field(&object, "evidence_v1").unwrap_or_else(|| NO_EVIDENCE.to_string()),
        evidence_v2: field(&object, "evidence_v2").unwrap_or_else(|| NO_EVIDENCE.to_string()),
        suggestion: field(&object, "suggestion").unwrap_or_default(),
    }
}

/// An `error`-status verdict. `raw` is kept in `evidence_v1` for diagnosis.
pub fn error_result(comment_id: &str, comment_text: &str, message: &str, raw: &str) -> AnalysisResult {
    AnalysisResult {
        comment_id: comment_id.to_string(),
        comment_text: comment_text.to_string(),
        status: Status::Error,
        explanation: message.to_string(),
        evidence_v1: raw.to_string(),
        evidence_v2: String::new(),
        suggestion: String::new(),
    }
}

/// String value of `key`; non-string values are rendered as JSON text and
/// `null` counts as missing.
fn field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
