//! `cvekb ask` and `cvekb rag`: before/after answer comparisons.
//!
//! Both commands ask the chat model the bare question first, then again with
//! retrieved context: graph triples for `ask`, corpus chunks for `rag`.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use crate::chat::create_chat_model;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::graph_store::load_graph;
use crate::progress::ProgressReporter;
use crate::qa::{compare_answers, compare_rag, Comparison, GraphContextQa};
use crate::retriever::VectorIndex;

pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    if !config.chat.is_enabled() {
        bail!("Chat provider is disabled. Set [chat] provider in the config to use `ask`.");
    }
    let graph = load_graph(&config.graph.path)
        .with_context(|| format!("Failed to load graph: {}", config.graph.path.display()))?;
    let chat = create_chat_model(&config.chat)?;
    let qa = GraphContextQa::new(chat.as_ref())?;

    let comparison = compare_answers(chat.as_ref(), &qa, question, &graph).await?;
    print_comparison(question, "GRAPH", &comparison);
    Ok(())
}

pub async fn run_rag(
    config: &Config,
    question: &str,
    corpus: Option<PathBuf>,
    top_n: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    if top_n == Some(0) {
        bail!("--top-n must be >= 1");
    }
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in the config to use `rag`.");
    }
    if !config.chat.is_enabled() {
        bail!("Chat provider is disabled. Set [chat] provider in the config to use `rag`.");
    }
    let Some(corpus) = corpus.or_else(|| config.retrieval.corpus.clone()) else {
        bail!("No corpus given. Pass --corpus or set [retrieval] corpus in the config.");
    };
    let top_n = top_n.unwrap_or(config.retrieval.top_n);

    let embedder = create_embedder(&config.embedding)?;
    let chat = create_chat_model(&config.chat)?;

    let index = VectorIndex::from_corpus_file(embedder.as_ref(), &corpus, progress).await?;
    let retrieved = index.retrieve(embedder.as_ref(), question, top_n).await?;

    println!("Retrieved {} of {} chunks:", retrieved.len(), index.len());
    for hit in &retrieved {
        println!("  [{:.4}] #{} {}", hit.similarity, hit.position, hit.text);
    }
    println!();

    let comparison = compare_rag(chat.as_ref(), question, &retrieved).await?;
    print_comparison(question, "RAG", &comparison);
    Ok(())
}

fn print_comparison(question: &str, label: &str, comparison: &Comparison) {
    println!("Query: {}", question);
    println!("**************** BEFORE {}: ****************", label);
    println!("{}", comparison.before);
    println!("**************** AFTER {}: *****************", label);
    println!("{}", comparison.after);
}
