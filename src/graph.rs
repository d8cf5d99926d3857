//! Directed attribute graph over CVE documents.
//!
//! Each vulnerability identifier becomes a node carrying its full
//! [`CveMetadata`]. Every attribute value (description, impact, date,
//! assigner, problem type) becomes a bare node, and the identifier points at
//! it through a labeled [`Relation`] edge:
//!
//! ```text
//!                    has_description ──▶ "Example flaw"
//!                    has_impact      ──▶ "7.5"
//!  CVE-2024-0001 ────published_on    ──▶ "2024-01-01"
//!                    assigner        ──▶ "vendor@example.com"
//!                    problem_type    ──▶ "CWE-79"
//! ```
//!
//! Vulnerability nodes and attribute nodes live in separate key spaces.
//! Whether equal attribute values are shared between identifiers is decided
//! by [`AttributeScope`].

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::models::{CveMetadata, UniformDocument};
use crate::progress::{ProgressEvent, ProgressReporter, Stage};

/// Edge label. The string forms are the vocabulary graph queries rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    HasDescription,
    HasImpact,
    PublishedOn,
    Assigner,
    ProblemType,
}

impl Relation {
    pub const ALL: [Relation; 5] = [
        Relation::HasDescription,
        Relation::HasImpact,
        Relation::PublishedOn,
        Relation::Assigner,
        Relation::ProblemType,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::HasDescription => "has_description",
            Relation::HasImpact => "has_impact",
            Relation::PublishedOn => "published_on",
            Relation::Assigner => "assigner",
            Relation::ProblemType => "problem_type",
        }
    }

    /// Singular relations appear exactly once per ingested identifier.
    pub fn is_singular(&self) -> bool {
        !matches!(self, Relation::ProblemType)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Relation::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown relation label: '{}'", s))
    }
}

/// How attribute-value nodes are keyed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeScope {
    /// One node per distinct value across the whole graph: two CVEs with
    /// impact 7.5 point at the same `"7.5"` node.
    #[default]
    Shared,
    /// One node per (identifier, value) pair; identifiers never share
    /// attribute nodes.
    PerIdentifier,
}

/// Identity of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKey {
    Vulnerability {
        id: String,
    },
    Attribute {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner: Option<String>,
    },
}

impl NodeKey {
    pub fn vulnerability(id: &str) -> Self {
        NodeKey::Vulnerability { id: id.to_string() }
    }

    pub fn label(&self) -> &str {
        match self {
            NodeKey::Vulnerability { id } => id,
            NodeKey::Attribute { value, .. } => value,
        }
    }
}

/// Node weight: its key, plus metadata for vulnerability nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub key: NodeKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CveMetadata>,
}

/// A `subject relation object` statement, as handed to question answering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub subject: String,
    pub relation: Relation,
    pub object: String,
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.relation, self.object)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStats {
    pub vulnerabilities: usize,
    pub attribute_nodes: usize,
    pub edges: usize,
    pub by_relation: BTreeMap<String, usize>,
}

/// Identifier-level comparison of two graphs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphDiff {
    pub only_in_self: Vec<String>,
    pub only_in_other: Vec<String>,
    pub changed: Vec<String>,
}

impl GraphDiff {
    pub fn is_empty(&self) -> bool {
        self.only_in_self.is_empty() && self.only_in_other.is_empty() && self.changed.is_empty()
    }
}

#[derive(Clone)]
pub struct KnowledgeGraph {
    graph: DiGraph<GraphNode, Relation>,
    index: HashMap<NodeKey, NodeIndex>,
    scope: AttributeScope,
}

impl Default for KnowledgeGraph {
    fn default() -> Self {
        Self::new(AttributeScope::default())
    }
}

impl fmt::Debug for KnowledgeGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnowledgeGraph")
            .field("scope", &self.scope)
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}

impl KnowledgeGraph {
    pub fn new(scope: AttributeScope) -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            scope,
        }
    }

    pub fn scope(&self) -> AttributeScope {
        self.scope
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Insert or replace a vulnerability from its document.
    ///
    /// The node's metadata is overwritten and all of its outgoing edges are
    /// replaced by the document's attributes. Attribute nodes are created on
    /// first reference and reused afterwards. Returns `false` (and changes
    /// nothing) when the document has an empty identifier.
    pub fn upsert_document(&mut self, doc: &UniformDocument) -> bool {
        self.upsert_metadata(&doc.metadata)
    }

    pub fn upsert_metadata(&mut self, meta: &CveMetadata) -> bool {
        let id = meta.id.as_str();
        if id.is_empty() {
            return false;
        }

        let node = self.ensure_node(NodeKey::vulnerability(id));
        tracing::debug!(id, "adding vulnerability node");
        self.graph[node].metadata = Some(meta.clone());
        self.clear_outgoing(node);

        self.link(node, id, Relation::HasDescription, &meta.description);
        self.link(node, id, Relation::HasImpact, &meta.impact.to_string());
        self.link(node, id, Relation::PublishedOn, &meta.published_date);
        self.link(node, id, Relation::Assigner, &meta.assigner);
        for problem_type in meta.problem_types.iter().filter(|p| !p.is_empty()) {
            self.link(node, id, Relation::ProblemType, problem_type);
        }
        true
    }

    fn ensure_node(&mut self, key: NodeKey) -> NodeIndex {
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.graph.add_node(GraphNode {
            key: key.clone(),
            metadata: None,
        });
        self.index.insert(key, idx);
        idx
    }

    fn clear_outgoing(&mut self, node: NodeIndex) {
        let mut outgoing: Vec<EdgeIndex> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| e.id())
            .collect();
        // remove_edge swaps the last edge into the freed slot, so go high to low.
        outgoing.sort_unstable_by(|a, b| b.cmp(a));
        for edge in outgoing {
            self.graph.remove_edge(edge);
        }
    }

    fn link(&mut self, from: NodeIndex, owner: &str, relation: Relation, value: &str) {
        let key = NodeKey::Attribute {
            value: value.to_string(),
            owner: match self.scope {
                AttributeScope::Shared => None,
                AttributeScope::PerIdentifier => Some(owner.to_string()),
            },
        };
        let to = self.ensure_node(key);
        let exists = self
            .graph
            .edges_connecting(from, to)
            .any(|e| *e.weight() == relation);
        if !exists {
            tracing::debug!(from = owner, to = value, relation = relation.as_str(), "adding edge");
            self.graph.add_edge(from, to, relation);
        }
    }

    pub fn contains_vulnerability(&self, id: &str) -> bool {
        self.index.contains_key(&NodeKey::vulnerability(id))
    }

    /// Metadata stored on a vulnerability node.
    pub fn vulnerability(&self, id: &str) -> Option<&CveMetadata> {
        let idx = self.index.get(&NodeKey::vulnerability(id))?;
        self.graph[*idx].metadata.as_ref()
    }

    /// All vulnerability identifiers, sorted.
    pub fn vulnerability_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .graph
            .node_weights()
            .filter_map(|n| match &n.key {
                NodeKey::Vulnerability { id } => Some(id.as_str()),
                NodeKey::Attribute { .. } => None,
            })
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Outgoing `(relation, value)` pairs of an identifier, ordered by
    /// relation then value.
    pub fn neighbors(&self, id: &str) -> Vec<(Relation, &str)> {
        let Some(&idx) = self.index.get(&NodeKey::vulnerability(id)) else {
            return Vec::new();
        };
        let mut out: Vec<(Relation, &str)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (*e.weight(), self.graph[e.target()].key.label()))
            .collect();
        out.sort();
        out
    }

    pub fn relation_count(&self, id: &str, relation: Relation) -> usize {
        self.neighbors(id)
            .into_iter()
            .filter(|(r, _)| *r == relation)
            .count()
    }

    pub fn triples_for(&self, id: &str) -> Vec<Triple> {
        self.neighbors(id)
            .into_iter()
            .map(|(relation, object)| Triple {
                subject: id.to_string(),
                relation,
                object: object.to_string(),
            })
            .collect()
    }

    pub fn stats(&self) -> GraphStats {
        let vulnerabilities = self
            .graph
            .node_weights()
            .filter(|n| matches!(n.key, NodeKey::Vulnerability { .. }))
            .count();
        let mut by_relation: BTreeMap<String, usize> = Relation::ALL
            .iter()
            .map(|r| (r.as_str().to_string(), 0))
            .collect();
        for relation in self.graph.edge_weights() {
            *by_relation.entry(relation.as_str().to_string()).or_default() += 1;
        }
        GraphStats {
            vulnerabilities,
            attribute_nodes: self.graph.node_count() - vulnerabilities,
            edges: self.graph.edge_count(),
            by_relation,
        }
    }

    /// Replay every vulnerability of `other` into this graph; on conflicting
    /// identifiers `other` wins.
    pub fn merge(&mut self, other: &KnowledgeGraph) {
        for id in other.vulnerability_ids() {
            if let Some(meta) = other.vulnerability(id) {
                self.upsert_metadata(meta);
            }
        }
    }

    pub fn diff(&self, other: &KnowledgeGraph) -> GraphDiff {
        let mine: BTreeSet<&str> = self.vulnerability_ids().into_iter().collect();
        let theirs: BTreeSet<&str> = other.vulnerability_ids().into_iter().collect();
        GraphDiff {
            only_in_self: mine.difference(&theirs).map(|s| s.to_string()).collect(),
            only_in_other: theirs.difference(&mine).map(|s| s.to_string()).collect(),
            changed: mine
                .intersection(&theirs)
                .filter(|id| {
                    self.vulnerability(id) != other.vulnerability(id)
                        || self.neighbors(id) != other.neighbors(id)
                })
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub(crate) fn raw(&self) -> &DiGraph<GraphNode, Relation> {
        &self.graph
    }

    /// Rebuild a graph from stored parts, rejecting duplicate node keys.
    pub(crate) fn from_raw(
        scope: AttributeScope,
        graph: DiGraph<GraphNode, Relation>,
    ) -> Result<Self, String> {
        let mut index = HashMap::with_capacity(graph.node_count());
        for idx in graph.node_indices() {
            if index.insert(graph[idx].key.clone(), idx).is_some() {
                return Err(format!("duplicate node key: {:?}", graph[idx].key));
            }
        }
        Ok(Self {
            graph,
            index,
            scope,
        })
    }

    fn node_map(&self) -> BTreeMap<&NodeKey, Option<&CveMetadata>> {
        self.graph
            .node_weights()
            .map(|n| (&n.key, n.metadata.as_ref()))
            .collect()
    }

    fn edge_set(&self) -> BTreeSet<(&NodeKey, Relation, &NodeKey)> {
        self.graph
            .edge_references()
            .map(|e| {
                (
                    &self.graph[e.source()].key,
                    *e.weight(),
                    &self.graph[e.target()].key,
                )
            })
            .collect()
    }
}

/// Structural equality: same nodes with the same attributes and the same
/// labeled edges, regardless of insertion order.
impl PartialEq for KnowledgeGraph {
    fn eq(&self, other: &Self) -> bool {
        self.scope == other.scope
            && self.graph.edge_count() == other.graph.edge_count()
            && self.node_map() == other.node_map()
            && self.edge_set() == other.edge_set()
    }
}

/// Build a graph from documents in order. Later documents with the same
/// identifier replace earlier ones.
pub fn build_graph(
    documents: &[UniformDocument],
    scope: AttributeScope,
    progress: &dyn ProgressReporter,
) -> KnowledgeGraph {
    const REPORT_EVERY: usize = 1000;

    let mut graph = KnowledgeGraph::new(scope);
    let total = documents.len() as u64;
    let mut skipped = 0usize;

    for (i, doc) in documents.iter().enumerate() {
        if !graph.upsert_document(doc) {
            skipped += 1;
        }
        let done = i + 1;
        if done % REPORT_EVERY == 0 || done == documents.len() {
            progress.report(ProgressEvent {
                stage: Stage::Building,
                n: done as u64,
                total,
            });
        }
    }

    if skipped > 0 {
        tracing::warn!(skipped, "documents without an identifier were not added");
    }
    tracing::info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "knowledge graph built"
    );
    graph
}
