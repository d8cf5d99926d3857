//! In-memory nearest-neighbor retrieval over a line-delimited text corpus.
//!
//! Every corpus line becomes one [`VectorIndexEntry`]; building the index
//! costs one embedding call per line, in corpus order. A query costs one
//! more call, after which every entry is scored with
//! [`cosine_similarity`] and the best `top_n` are returned.
//!
//! Ranking is deterministic: entries are sorted by similarity descending
//! with a stable sort, so equal scores keep corpus order.

use anyhow::{Context, Result};
use std::path::Path;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::KbError;
use crate::progress::{ProgressEvent, ProgressReporter, Stage};

/// Default number of chunks returned by [`VectorIndex::retrieve`].
pub const DEFAULT_TOP_N: usize = 10;

const PROGRESS_EVERY: usize = 100;

/// One corpus line and its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndexEntry {
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A ranked retrieval result.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieved {
    pub text: String,
    pub similarity: f32,
    /// Zero-based corpus line this chunk came from.
    pub position: usize,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    entries: Vec<VectorIndexEntry>,
    model: String,
}

impl VectorIndex {
    /// Embed every line in order.
    ///
    /// All vectors must share the dimension of the first one.
    pub async fn build(
        embedder: &dyn Embedder,
        lines: &[String],
        progress: &dyn ProgressReporter,
    ) -> Result<Self, KbError> {
        let total = lines.len() as u64;
        let mut entries: Vec<VectorIndexEntry> = Vec::with_capacity(lines.len());

        for (i, line) in lines.iter().enumerate() {
            let embedding = embedder.embed(line).await?;
            if let Some(first) = entries.first() {
                if first.embedding.len() != embedding.len() {
                    return Err(KbError::DimensionMismatch {
                        expected: first.embedding.len(),
                        actual: embedding.len(),
                    });
                }
            }
            entries.push(VectorIndexEntry {
                text: line.clone(),
                embedding,
            });

            let done = i + 1;
            if done % PROGRESS_EVERY == 0 || done == lines.len() {
                progress.report(ProgressEvent {
                    stage: Stage::Indexing,
                    n: done as u64,
                    total,
                });
            }
        }

        tracing::info!(
            model = embedder.model_name(),
            entries = entries.len(),
            "vector index built"
        );
        Ok(Self {
            entries,
            model: embedder.model_name().to_string(),
        })
    }

    /// Read `path` with [`read_corpus`] and build an index over its lines.
    pub async fn from_corpus_file(
        embedder: &dyn Embedder,
        path: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<Self> {
        let lines = read_corpus(path)?;
        let index = Self::build(embedder, &lines, progress)
            .await
            .with_context(|| format!("Failed to index corpus: {}", path.display()))?;
        Ok(index)
    }

    pub fn entries(&self) -> &[VectorIndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Rank every entry against `query` and keep the first `top_n`.
    ///
    /// A zero-norm query fails with `DegenerateVector { index: None }`; a
    /// zero-norm entry fails with the entry's corpus position.
    pub async fn retrieve(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        top_n: usize,
    ) -> Result<Vec<Retrieved>, KbError> {
        let query_vec = embedder.embed(query).await?;
        if is_zero(&query_vec) {
            return Err(KbError::DegenerateVector { index: None });
        }

        let mut scored: Vec<Retrieved> = Vec::with_capacity(self.entries.len());
        for (position, entry) in self.entries.iter().enumerate() {
            let similarity = cosine_similarity(&query_vec, &entry.embedding).map_err(|e| match e {
                KbError::DegenerateVector { .. } => KbError::DegenerateVector {
                    index: Some(position),
                },
                KbError::NonFiniteVector { .. } => KbError::NonFiniteVector {
                    index: Some(position),
                },
                other => other,
            })?;
            scored.push(Retrieved {
                text: entry.text.clone(),
                similarity,
                position,
            });
        }

        // sort_by is stable: ties stay in corpus order.
        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(top_n);

        tracing::debug!(query, top_n, returned = scored.len(), "retrieved chunks");
        Ok(scored)
    }
}

fn is_zero(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}

/// Read a corpus file, one chunk per line.
///
/// Line terminators (`\n` or `\r\n`) are stripped. Blank lines are kept, so
/// the chunk count always equals the line count.
pub fn read_corpus(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus: {}", path.display()))?;
    Ok(raw
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect())
}

/// Render retrieved chunks as the bulleted block used in the RAG prompt.
pub fn context_block(chunks: &[Retrieved]) -> String {
    chunks
        .iter()
        .map(|c| format!(" - {}", c.text))
        .collect::<Vec<_>>()
        .join("\n")
}
