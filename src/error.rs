//! Typed errors for the library surface.
//!
//! Orchestration code (the pipeline and the CLI) wraps these in
//! `anyhow::Error` with context; callers that need to branch on a failure
//! kind (rebuild a graph, retry a service call) match on [`KbError`].

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the normalization, graph and retrieval layers.
#[derive(Error, Debug)]
pub enum KbError {
    /// The file is not a serialized knowledge graph, or it is corrupt.
    #[error("invalid graph file {path}: {reason}")]
    GraphFormat { path: PathBuf, reason: String },

    /// A zero-norm embedding made cosine similarity undefined.
    ///
    /// `index` is the corpus position of the offending entry, or `None`
    /// when the query vector itself is degenerate.
    #[error("degenerate embedding vector (zero norm){}", line_suffix(.index))]
    DegenerateVector { index: Option<usize> },

    /// An embedding had a NaN or infinite component.
    #[error("non-finite embedding vector{}", line_suffix(.index))]
    NonFiniteVector { index: Option<usize> },

    /// Two vectors that must share a dimension do not.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// An external embedding or chat service could not be reached or
    /// kept failing after retries.
    #[error("{service} unavailable during {operation} (input: {input:?}): {reason}")]
    ServiceUnavailable {
        service: String,
        operation: String,
        input: String,
        reason: String,
    },

    /// The service answered, but not with something we can use.
    #[error("{service} returned an invalid response: {reason}")]
    InvalidResponse { service: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl KbError {
    pub(crate) fn unavailable(
        service: &str,
        operation: &str,
        input: &str,
        reason: impl ToString,
    ) -> Self {
        KbError::ServiceUnavailable {
            service: service.to_string(),
            operation: operation.to_string(),
            input: truncate_input(input),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn graph_format(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        KbError::GraphFormat {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True when a caller-level retry could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, KbError::ServiceUnavailable { .. })
    }
}

fn line_suffix(index: &Option<usize>) -> String {
    index
        .map(|i| format!(" at corpus line {}", i))
        .unwrap_or_default()
}

/// Keep error messages readable when the input is a long corpus line.
fn truncate_input(input: &str) -> String {
    const MAX_CHARS: usize = 120;
    if input.chars().count() <= MAX_CHARS {
        input.to_string()
    } else {
        let head: String = input.chars().take(MAX_CHARS).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_service_errors_are_transient() {
        assert!(KbError::unavailable("ollama", "embed", "x", "refused").is_transient());
        assert!(!KbError::DegenerateVector { index: Some(2) }.is_transient());
        assert!(!KbError::graph_format("g.kg", "bad magic").is_transient());
    }

    #[test]
    fn degenerate_message_names_the_line() {
        let msg = KbError::DegenerateVector { index: Some(3) }.to_string();
        assert!(msg.contains("corpus line 3"));
        let msg = KbError::DegenerateVector { index: None }.to_string();
        assert!(!msg.contains("corpus line"));
    }

    #[test]
    fn long_inputs_are_truncated() {
        let long = "a".repeat(500);
        match KbError::unavailable("openai", "embed", &long, "timeout") {
            KbError::ServiceUnavailable { input, .. } => {
                assert!(input.len() < 200);
                assert!(input.ends_with("..."));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
