//! Core data models shared by the ingestion pipeline and the graph.
//!
//! Records flow through three shapes: the normalized projection written to
//! disk ([`NormalizedRecord`]), the uniform document handed to the graph
//! builder ([`UniformDocument`]), and the metadata stored on each
//! vulnerability node ([`CveMetadata`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Sentinel for an unknown identifier, date, assigner or problem type.
pub const UNKNOWN: &str = "Unknown";
/// Sentinel for a missing description.
pub const NO_DESCRIPTION: &str = "No description";
/// Sentinel for a missing impact score.
pub const NOT_AVAILABLE: &str = "N/A";

/// CVSS base score, or a textual placeholder when the feed had none.
///
/// Serialized untagged so the normalized files carry either a JSON number
/// or the `"N/A"` string, matching the upstream feed shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImpactScore {
    Score(f64),
    Label(String),
}

impl ImpactScore {
    pub fn not_available() -> Self {
        ImpactScore::Label(NOT_AVAILABLE.to_string())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ImpactScore::Score(s) => Some(*s),
            ImpactScore::Label(_) => None,
        }
    }
}

impl Default for ImpactScore {
    fn default() -> Self {
        ImpactScore::Label(String::new())
    }
}

impl fmt::Display for ImpactScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Whole scores keep one decimal so 10.0 and "10" stay distinct.
            ImpactScore::Score(s) if s.fract() == 0.0 && s.is_finite() => write!(f, "{:.1}", s),
            ImpactScore::Score(s) => write!(f, "{}", s),
            ImpactScore::Label(l) => f.write_str(l),
        }
    }
}

/// One CVE after field extraction. Every field is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NormalizedRecord {
    pub cve_id: String,
    pub description: String,
    pub impact_score: ImpactScore,
    pub published_date: String,
    pub assigner: String,
    pub problemtype_descriptions: Vec<String>,
}

/// On-disk shape of a normalized file: `{"CVEs": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NormalizedFile {
    #[serde(rename = "CVEs", default)]
    pub cves: Vec<NormalizedRecord>,
}

/// Metadata mapping carried by a document and stored on its graph node.
///
/// Keys are fixed; graph question answering reads them by these names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CveMetadata {
    pub id: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Impact")]
    pub impact: ImpactScore,
    #[serde(rename = "PublishedDate")]
    pub published_date: String,
    #[serde(rename = "Assigner")]
    pub assigner: String,
    #[serde(rename = "ProblemType")]
    pub problem_types: Vec<String>,
}

/// A description body plus its metadata; the unit the graph builder consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformDocument {
    pub page_content: String,
    pub metadata: CveMetadata,
}

impl UniformDocument {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// The metadata mapping as a JSON object with its fixed keys.
    pub fn metadata_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.metadata).unwrap_or(serde_json::Value::Null)
    }
}

/// Identifiers seen during one normalization run.
///
/// `recent` only grows through [`IdentifierSets::record`], which also adds
/// to `all`, so `recent ⊆ all` holds by construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentifierSets {
    all: BTreeSet<String>,
    recent: BTreeSet<String>,
}

impl IdentifierSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: &str, recent: bool) {
        self.all.insert(id.to_string());
        if recent {
            self.recent.insert(id.to_string());
        }
    }

    pub fn all(&self) -> &BTreeSet<String> {
        &self.all
    }

    pub fn recent(&self) -> &BTreeSet<String> {
        &self.recent
    }

    pub fn extend(&mut self, other: IdentifierSets) {
        self.all.extend(other.all);
        self.recent.extend(other.recent);
    }

    /// Identifier to use for a smoke-test question: the smallest recent
    /// one, falling back to the smallest seen overall.
    pub fn representative(&self) -> Option<&str> {
        self.recent
            .iter()
            .next()
            .or_else(|| self.all.iter().next())
            .map(String::as_str)
    }
}
