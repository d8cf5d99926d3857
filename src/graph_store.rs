//! Persisting a [`KnowledgeGraph`] to a single binary file.
//!
//! # File layout
//!
//! ```text
//! offset  size  field
//! 0       8     magic "CVEKGRPH"
//! 8       4     format version (u32, little-endian)
//! 12      8     payload length in bytes (u64, little-endian)
//! 20      32    SHA-256 of the payload
//! 52      n     payload: JSON snapshot of nodes and labeled edges
//! ```
//!
//! Edges are stored with their string relation labels so the file stays
//! readable by tools that only know the label vocabulary.

use chrono::{DateTime, Utc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::KbError;
use crate::graph::{AttributeScope, GraphNode, KnowledgeGraph, Relation};

const MAGIC: &[u8; 8] = b"CVEKGRPH";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8 + 4 + 8 + 32;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    saved_at: DateTime<Utc>,
    scope: AttributeScope,
    nodes: Vec<GraphNode>,
    edges: Vec<EdgeRecord>,
}

#[derive(Serialize, Deserialize)]
struct EdgeRecord {
    from: usize,
    relation: String,
    to: usize,
}

/// A graph read back from disk, with the time it was written.
#[derive(Debug)]
pub struct LoadedGraph {
    pub graph: KnowledgeGraph,
    pub saved_at: DateTime<Utc>,
}

/// Serialize `graph` to `path`, replacing any existing file.
///
/// The file is written next to its destination and renamed into place, so a
/// crash never leaves a half-written graph behind.
pub fn save_graph(graph: &KnowledgeGraph, path: &Path) -> Result<(), KbError> {
    let bytes = encode(graph)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    if let Err(e) = write_and_rename(&tmp, path, &bytes) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }

    tracing::info!(
        path = %path.display(),
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        bytes = bytes.len(),
        "graph saved"
    );
    Ok(())
}

fn write_and_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(tmp, path)
}

pub fn load_graph(path: &Path) -> Result<KnowledgeGraph, KbError> {
    load_graph_with_meta(path).map(|loaded| loaded.graph)
}

pub fn load_graph_with_meta(path: &Path) -> Result<LoadedGraph, KbError> {
    let bytes = std::fs::read(path)?;
    decode(&bytes).map_err(|reason| KbError::graph_format(path, reason))
}

fn encode(graph: &KnowledgeGraph) -> Result<Vec<u8>, KbError> {
    let raw = graph.raw();
    let snapshot = Snapshot {
        saved_at: Utc::now(),
        scope: graph.scope(),
        nodes: raw.node_weights().cloned().collect(),
        edges: raw
            .edge_references()
            .map(|e| EdgeRecord {
                from: e.source().index(),
                relation: e.weight().as_str().to_string(),
                to: e.target().index(),
            })
            .collect(),
    };
    let payload = serde_json::to_vec(&snapshot)?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&Sha256::digest(&payload));
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> Result<LoadedGraph, String> {
    if bytes.len() < HEADER_LEN {
        return Err(format!("file too short ({} bytes)", bytes.len()));
    }
    if &bytes[0..8] != MAGIC {
        return Err("not a knowledge graph file (bad magic)".to_string());
    }

    let version = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    if version != FORMAT_VERSION {
        return Err(format!("unsupported format version {}", version));
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[12..20]);
    let payload_len = u64::from_le_bytes(len_bytes) as usize;
    let payload = &bytes[HEADER_LEN..];
    if payload.len() != payload_len {
        return Err(format!(
            "payload length mismatch: header says {}, file has {}",
            payload_len,
            payload.len()
        ));
    }

    if Sha256::digest(payload).as_slice() != &bytes[20..52] {
        return Err("payload checksum mismatch".to_string());
    }

    let snapshot: Snapshot =
        serde_json::from_slice(payload).map_err(|e| format!("undecodable payload: {}", e))?;

    let mut graph: DiGraph<GraphNode, Relation> =
        DiGraph::with_capacity(snapshot.nodes.len(), snapshot.edges.len());
    for node in snapshot.nodes {
        graph.add_node(node);
    }
    let node_count = graph.node_count();
    for edge in snapshot.edges {
        if edge.from >= node_count || edge.to >= node_count {
            return Err(format!(
                "edge {} -> {} points outside {} nodes",
                edge.from, edge.to, node_count
            ));
        }
        let relation: Relation = edge.relation.parse()?;
        graph.add_edge(NodeIndex::new(edge.from), NodeIndex::new(edge.to), relation);
    }

    let graph = KnowledgeGraph::from_raw(snapshot.scope, graph)?;
    Ok(LoadedGraph {
        graph,
        saved_at: snapshot.saved_at,
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
