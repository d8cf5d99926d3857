//! Inspection commands for a persisted knowledge graph.
//!
//! `cvekb graph stats` prints node, edge and per-relation counts,
//! `cvekb graph show <ID>` prints one vulnerability and its edges, and
//! `cvekb graph diff <OTHER>` compares the configured graph with another file.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::graph::KnowledgeGraph;
use crate::graph_store::{load_graph, load_graph_with_meta};

/// Run the stats command: load the graph and print a summary.
pub fn run_stats(config: &Config) -> Result<()> {
    let path = &config.graph.path;
    let loaded = load_graph_with_meta(path)
        .with_context(|| format!("Failed to load graph: {}", path.display()))?;
    let stats = loaded.graph.stats();

    let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    println!("CVE Knowledge Graph Stats");
    println!("=========================");
    println!();
    println!("  Graph:            {}", path.display());
    println!("  Size:             {}", format_bytes(file_size));
    println!(
        "  Saved:            {}",
        loaded.saved_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!("  Scope:            {:?}", loaded.graph.scope());
    println!();
    println!("  Vulnerabilities:  {}", stats.vulnerabilities);
    println!("  Attribute nodes:  {}", stats.attribute_nodes);
    println!("  Edges:            {}", stats.edges);

    if !stats.by_relation.is_empty() {
        println!();
        println!("  By relation:");
        println!("  {:<20} {:>8}", "RELATION", "EDGES");
        println!("  {}", "-".repeat(29));
        for (relation, count) in &stats.by_relation {
            println!("  {:<20} {:>8}", relation, count);
        }
    }

    println!();
    Ok(())
}

/// Print the metadata and outgoing edges of one vulnerability.
pub fn run_show(config: &Config, id: &str) -> Result<()> {
    let graph = open(&config.graph.path)?;
    let Some(meta) = graph.vulnerability(id) else {
        bail!("Vulnerability not found in graph: {}", id);
    };

    println!("{}", meta.id);
    println!("  published: {}", meta.published_date);
    println!("  assigner:  {}", meta.assigner);
    println!("  impact:    {}", meta.impact);
    println!("  problem types: {}", meta.problem_types.join(", "));
    println!();
    println!("  {}", meta.description);
    println!();
    for triple in graph.triples_for(id) {
        println!("  {}", triple);
    }
    Ok(())
}

/// Compare the configured graph (`self`) with the graph at `other`.
pub fn run_diff(config: &Config, other: &Path) -> Result<()> {
    let mine = open(&config.graph.path)?;
    let theirs = open(other)?;
    let diff = mine.diff(&theirs);

    println!("diff {} {}", config.graph.path.display(), other.display());
    if diff.is_empty() {
        println!("  identical vulnerability sets and attributes");
        return Ok(());
    }
    for id in &diff.only_in_self {
        println!("  + {}", id);
    }
    for id in &diff.only_in_other {
        println!("  - {}", id);
    }
    for id in &diff.changed {
        println!("  ~ {}", id);
    }
    println!(
        "  {} only here, {} only in other, {} changed",
        diff.only_in_self.len(),
        diff.only_in_other.len(),
        diff.changed.len()
    );
    Ok(())
}

fn open(path: &Path) -> Result<KnowledgeGraph> {
    load_graph(path).with_context(|| format!("Failed to load graph: {}", path.display()))
}

/// Graph files stay well below a gigabyte; larger sizes print in MB.
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 2] = ["KB", "MB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit + 1 < UNITS.len() {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}
