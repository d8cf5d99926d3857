//! # CVE Knowledge Base
//!
//! Turns raw vulnerability-disclosure feeds into a queryable knowledge graph
//! and answers questions with retrieved context.
//!
//! Raw NVD-style JSON feeds are filtered down to six fields per record,
//! loaded back as uniform documents, and assembled into a directed graph
//! linking each vulnerability to its description, impact score, publication
//! date, assigner and problem types. The graph is persisted to a single
//! checksummed file. Independently, an in-memory vector index over any
//! line-delimited text corpus supports top-N similarity retrieval.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Raw feeds  │──▶│ normalize  │──▶│ loader       │──▶│ graph       │
//! │ CVE_Items  │   │ 6 fields   │   │ documents    │   │ petgraph    │
//! └────────────┘   └────────────┘   └──────────────┘   └──────┬──────┘
//!                                                             ▼
//!                  ┌────────────┐   ┌──────────────┐   ┌─────────────┐
//!                  │ chat       │◀──│ qa           │◀──│ graph_store │
//!                  └────────────┘   └──────────────┘   └─────────────┘
//!                        ▲
//!  ┌────────────┐   ┌────┴───────┐
//!  │ corpus.txt │──▶│ retriever  │  (embedding per line, cosine top-N)
//!  └────────────┘   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cvekb normalize                     # raw feeds → data/filtered
//! cvekb build                         # full ingest, writes graph_store.kg
//! cvekb graph show CVE-2024-0001
//! cvekb ask "What is CVE-2024-0001?"
//! cvekb rag "how much do cats sleep" --corpus data/text/cat_facts.txt
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed library errors |
//! | [`models`] | Normalized records, documents, identifier sets |
//! | [`normalize`] | Raw feed filtering |
//! | [`loader`] | Normalized files → documents |
//! | [`graph`] | Knowledge graph construction and queries |
//! | [`graph_store`] | Graph persistence |
//! | [`embedding`] | Embedding providers and cosine similarity |
//! | [`retriever`] | Vector index and top-N retrieval |
//! | [`chat`] | Chat-completion providers |
//! | [`qa`] | Graph QA and before/after comparisons |
//! | [`pipeline`] | Batch ingestion |
//! | [`progress`] | Progress reporting on stderr |

pub mod ask_cmd;
pub mod chat;
pub mod config;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod graph_cmd;
pub mod graph_store;
mod http;
pub mod loader;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod qa;
pub mod retriever;
