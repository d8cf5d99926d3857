//! Library-level pipeline tests with stub model services.

use async_trait::async_trait;
use cve_kb::chat::{ChatMessage, ChatModel};
use cve_kb::config::Config;
use cve_kb::embedding::Embedder;
use cve_kb::error::KbError;
use cve_kb::graph::{build_graph, AttributeScope, Relation};
use cve_kb::graph_store::{load_graph, save_graph};
use cve_kb::loader::load_documents;
use cve_kb::models::ImpactScore;
use cve_kb::normalize::normalize_feeds;
use cve_kb::progress::NoProgress;
use cve_kb::qa::{compare_answers, compare_rag, GraphContextQa};
use cve_kb::retriever::VectorIndex;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn config_in(root: &Path) -> Config {
    let mut config = Config::minimal();
    config.feeds.input_dir = root.join("json");
    config.feeds.output_dir = root.join("filtered");
    config.graph.path = root.join("graph_store.kg");
    config
}

fn example_item(id: &str, problem_types: &[&str]) -> serde_json::Value {
    let problemtype_data: Vec<serde_json::Value> = problem_types
        .iter()
        .map(|p| json!({ "description": [{ "lang": "en", "value": p }] }))
        .collect();
    json!({
        "cve": {
            "CVE_data_meta": { "ID": id, "ASSIGNER": "vendor@example.com" },
            "problemtype": { "problemtype_data": problemtype_data },
            "description": { "description_data": [{ "lang": "en", "value": "Example flaw" }] }
        },
        "impact": { "baseMetricV3": { "cvssV3": { "baseScore": 7.5 } } },
        "publishedDate": "2024-01-01"
    })
}

#[test]
fn single_record_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    fs::create_dir_all(&config.feeds.input_dir).unwrap();
    fs::write(
        config.feeds.input_dir.join("feed-2024.json"),
        json!({ "CVE_Items": [example_item("CVE-2024-0001", &["CWE-79"])] }).to_string(),
    )
    .unwrap();

    let report = normalize_feeds(&config.feeds, &NoProgress).unwrap();
    assert_eq!(report.records_written, 1);
    assert!(report.failed.is_empty());
    assert!(report.ids.recent().is_subset(report.ids.all()));
    assert_eq!(report.ids.representative(), Some("CVE-2024-0001"));

    let loaded = load_documents(&config.feeds.output_dir).unwrap();
    assert_eq!(loaded.documents.len(), 1);
    let meta = &loaded.documents[0].metadata;
    assert_eq!(meta.id, "CVE-2024-0001");
    assert_eq!(meta.description, "Example flaw");
    assert_eq!(meta.impact, ImpactScore::Score(7.5));
    assert_eq!(meta.published_date, "2024-01-01");
    assert_eq!(meta.assigner, "vendor@example.com");
    assert_eq!(meta.problem_types, vec!["CWE-79".to_string()]);

    let graph = build_graph(&loaded.documents, AttributeScope::Shared, &NoProgress);
    assert_eq!(
        graph.neighbors("CVE-2024-0001"),
        vec![
            (Relation::HasDescription, "Example flaw"),
            (Relation::HasImpact, "7.5"),
            (Relation::PublishedOn, "2024-01-01"),
            (Relation::Assigner, "vendor@example.com"),
            (Relation::ProblemType, "CWE-79"),
        ]
    );

    save_graph(&graph, &config.graph.path).unwrap();
    assert_eq!(load_graph(&config.graph.path).unwrap(), graph);
}

#[test]
fn reingested_identifier_keeps_edge_cardinality() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    fs::create_dir_all(&config.feeds.input_dir).unwrap();
    fs::write(
        config.feeds.input_dir.join("a.json"),
        json!({ "CVE_Items": [example_item("CVE-2024-0001", &["CWE-79", "CWE-89"])] }).to_string(),
    )
    .unwrap();
    fs::write(
        config.feeds.input_dir.join("b.json"),
        json!({ "CVE_Items": [example_item("CVE-2024-0001", &["CWE-20"])] }).to_string(),
    )
    .unwrap();

    normalize_feeds(&config.feeds, &NoProgress).unwrap();
    let loaded = load_documents(&config.feeds.output_dir).unwrap();
    assert_eq!(loaded.documents.len(), 2);

    let graph = build_graph(&loaded.documents, AttributeScope::Shared, &NoProgress);
    for relation in [
        Relation::HasDescription,
        Relation::HasImpact,
        Relation::PublishedOn,
        Relation::Assigner,
    ] {
        assert_eq!(graph.relation_count("CVE-2024-0001", relation), 1);
    }
    assert_eq!(graph.relation_count("CVE-2024-0001", Relation::ProblemType), 1);
}

// ============ Stub services ============

const VOCAB: [&str; 5] = ["cats", "sleep", "dogs", "bark", "carnivores"];

struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-stub"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KbError> {
        let mut v: Vec<f32> = VOCAB
            .iter()
            .map(|term| text.split_whitespace().filter(|w| w == term).count() as f32)
            .collect();
        v.push(0.1);
        Ok(v)
    }
}

/// Replies with the number of messages it was sent and, when present, the
/// system prompt.
struct CountingChat;

#[async_trait]
impl ChatModel for CountingChat {
    fn model_name(&self) -> &str {
        "counting-stub"
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, KbError> {
        let system = messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .unwrap_or("");
        Ok(format!("{} message(s) {}", messages.len(), system))
    }
}

#[tokio::test]
async fn cat_facts_retrieval_and_rag() {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("cat_facts.txt");
    fs::write(
        &corpus,
        "cats sleep 16 hours a day\ndogs bark\ncats are obligate carnivores\n",
    )
    .unwrap();

    let index = VectorIndex::from_corpus_file(&KeywordEmbedder, &corpus, &NoProgress)
        .await
        .unwrap();
    assert_eq!(index.len(), 3);

    let hits = index
        .retrieve(&KeywordEmbedder, "how much do cats sleep", 1)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "cats sleep 16 hours a day");

    let again = index
        .retrieve(&KeywordEmbedder, "how much do cats sleep", 1)
        .await
        .unwrap();
    assert_eq!(hits, again);

    let comparison = compare_rag(&CountingChat, "how much do cats sleep", &hits)
        .await
        .unwrap();
    assert_eq!(comparison.before.trim_end(), "1 message(s)");
    assert!(comparison.after.starts_with("2 message(s)"));
    assert!(comparison.after.contains(" - cats sleep 16 hours a day"));
}

#[tokio::test]
async fn graph_question_uses_saved_graph() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    fs::create_dir_all(&config.feeds.input_dir).unwrap();
    fs::write(
        config.feeds.input_dir.join("feed.json"),
        json!({ "CVE_Items": [example_item("CVE-2024-0001", &["CWE-79"])] }).to_string(),
    )
    .unwrap();
    cve_kb::pipeline::run_ingest(&config, &NoProgress).unwrap();

    let graph = load_graph(&config.graph.path).unwrap();
    let chat = CountingChat;
    let qa = GraphContextQa::new(&chat).unwrap();
    let comparison = compare_answers(&chat, &qa, "How bad is CVE-2024-0001?", &graph)
        .await
        .unwrap();
    assert_eq!(comparison.before.trim_end(), "1 message(s)");
    assert!(comparison.after.contains("CVE-2024-0001 has_impact 7.5"));
    assert!(comparison.after.contains("CVE-2024-0001 problem_type CWE-79"));
}
