//! Batch ingestion: raw feeds → normalized files → documents → graph file.
//!
//! One run walks the whole pipeline in order:
//!
//! 1. **Normalize** every feed file under `feeds.input_dir`.
//! 2. **Load** every normalized file under `feeds.output_dir`.
//! 3. **Build** the knowledge graph from the loaded documents.
//! 4. **Compare** against `graph.baseline` when configured, and fold the
//!    baseline's vulnerabilities in underneath the fresh build.
//! 5. **Save** the graph to `graph.path`.
//!
//! A bad feed or normalized file never aborts the run; it is logged and
//! listed in the summary. Failing to write the graph does.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::Config;
use crate::error::KbError;
use crate::graph::{build_graph, GraphDiff, KnowledgeGraph};
use crate::graph_store::{load_graph, save_graph};
use crate::loader::load_documents;
use crate::normalize::{normalize_feeds, FailedFile, NormalizeReport};
use crate::progress::ProgressReporter;

/// What one ingestion run did.
#[derive(Debug)]
pub struct IngestSummary {
    pub files_normalized: usize,
    /// Feed and normalized files that were skipped, feeds first.
    pub failed: Vec<FailedFile>,
    pub records: usize,
    pub documents: usize,
    pub nodes: usize,
    pub edges: usize,
    pub representative: Option<String>,
    pub baseline_diff: Option<GraphDiff>,
    pub graph_path: PathBuf,
}

/// Run only the normalization stage and print its summary.
pub fn run_normalize(config: &Config, progress: &dyn ProgressReporter) -> Result<NormalizeReport> {
    let report = normalize_feeds(&config.feeds, progress)?;

    println!("normalize {}", config.feeds.input_dir.display());
    println!("  files written: {}", report.files_written.len());
    println!("  records: {}", report.records_written);
    println!("  identifiers: {} ({} recent)", report.ids.all().len(), report.ids.recent().len());
    for failed in &report.failed {
        println!("  failed: {} ({})", failed.path.display(), failed.error);
    }
    if let Some(id) = report.ids.representative() {
        println!("  representative: {}", id);
    }
    println!("ok");

    Ok(report)
}

/// Run the full pipeline and persist the graph.
pub fn run_ingest(config: &Config, progress: &dyn ProgressReporter) -> Result<IngestSummary> {
    let normalized = normalize_feeds(&config.feeds, progress)?;

    let loaded = load_documents(&config.feeds.output_dir)?;
    let fresh = build_graph(&loaded.documents, config.graph.attribute_nodes, progress);

    let (graph, baseline_diff) = match &config.graph.baseline {
        Some(path) => match load_baseline(path)? {
            Some(baseline) => {
                let diff = fresh.diff(&baseline);
                tracing::info!(
                    baseline = %path.display(),
                    added = diff.only_in_self.len(),
                    kept = diff.only_in_other.len(),
                    changed = diff.changed.len(),
                    "compared against baseline"
                );
                let mut merged = KnowledgeGraph::new(config.graph.attribute_nodes);
                merged.merge(&baseline);
                merged.merge(&fresh);
                (merged, Some(diff))
            }
            None => (fresh, None),
        },
        None => (fresh, None),
    };

    save_graph(&graph, &config.graph.path).with_context(|| {
        format!("Failed to save graph: {}", config.graph.path.display())
    })?;

    let mut failed = normalized.failed;
    failed.extend(loaded.failed);

    let summary = IngestSummary {
        files_normalized: normalized.files_written.len(),
        failed,
        records: normalized.records_written,
        documents: loaded.documents.len(),
        nodes: graph.node_count(),
        edges: graph.edge_count(),
        representative: normalized.ids.representative().map(str::to_string),
        baseline_diff,
        graph_path: config.graph.path.clone(),
    };
    print_summary(&summary);
    Ok(summary)
}

/// A missing or unreadable baseline only warns; the fresh build stands alone.
fn load_baseline(path: &std::path::Path) -> Result<Option<KnowledgeGraph>> {
    match load_graph(path) {
        Ok(graph) => Ok(Some(graph)),
        Err(KbError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(baseline = %path.display(), "baseline graph not found, skipping comparison");
            Ok(None)
        }
        Err(e @ KbError::GraphFormat { .. }) => {
            tracing::warn!(error = %e, "baseline graph unreadable, skipping comparison");
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load baseline: {}", path.display())),
    }
}

fn print_summary(summary: &IngestSummary) {
    println!("build");
    println!("  feed files normalized: {}", summary.files_normalized);
    println!("  files failed: {}", summary.failed.len());
    for failed in &summary.failed {
        println!("  failed: {} ({})", failed.path.display(), failed.error);
    }
    println!("  records: {}", summary.records);
    println!("  documents: {}", summary.documents);
    println!("  graph: {} nodes, {} edges", summary.nodes, summary.edges);
    if let Some(diff) = &summary.baseline_diff {
        println!(
            "  baseline: {} new, {} only in baseline, {} changed",
            diff.only_in_self.len(),
            diff.only_in_other.len(),
            diff.changed.len()
        );
    }
    if let Some(id) = &summary.representative {
        println!("  representative: {}", id);
    }
    println!("  saved: {}", summary.graph_path.display());
    println!("ok");
}
