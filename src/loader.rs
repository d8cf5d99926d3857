//! Reads normalized files back into [`UniformDocument`]s.
//!
//! Per-file record order is kept; files are visited in sorted path order.
//! No deduplication happens here: a repeated identifier produces a second
//! document and the graph builder's upsert decides the outcome.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::{CveMetadata, NormalizedFile, NormalizedRecord, UniformDocument};
use crate::normalize::FailedFile;

#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<UniformDocument>,
    pub files_read: usize,
    pub failed: Vec<FailedFile>,
}

pub fn load_documents(dir: &Path) -> Result<LoadReport> {
    if !dir.is_dir() {
        bail!("Normalized directory does not exist: {}", dir.display());
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|e| e == "json") {
            files.push(path.to_path_buf());
        }
    }
    files.sort();

    let mut report = LoadReport::default();
    for path in files {
        match read_normalized(&path) {
            Ok(file) => {
                tracing::debug!(path = %path.display(), records = file.cves.len(), "loaded normalized file");
                report.files_read += 1;
                report
                    .documents
                    .extend(file.cves.into_iter().map(to_document));
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %format!("{:#}", e), "skipping normalized file");
                report.failed.push(FailedFile {
                    path,
                    error: format!("{:#}", e),
                });
            }
        }
    }

    Ok(report)
}

fn read_normalized(path: &Path) -> Result<NormalizedFile> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open normalized file: {}", path.display()))?;
    let parsed = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse normalized file: {}", path.display()))?;
    Ok(parsed)
}

/// Turn one normalized record into a document, flattening the description
/// to a single line.
pub fn to_document(record: NormalizedRecord) -> UniformDocument {
    let description = single_line(&record.description);
    UniformDocument {
        page_content: description.clone(),
        metadata: CveMetadata {
            id: record.cve_id,
            description,
            impact: record.impact_score,
            published_date: record.published_date,
            assigner: record.assigner,
            problem_types: record.problemtype_descriptions,
        },
    }
}

fn single_line(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}
