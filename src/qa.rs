//! Question answering over the knowledge graph and over retrieved chunks.
//!
//! [`GraphContextQa`] finds the vulnerability identifiers mentioned in a
//! question, renders their triples as context and asks a [`ChatModel`].
//! [`compare_answers`] and [`compare_rag`] produce the before/after pair the
//! CLI prints: the plain model answer next to the context-augmented one.

use async_trait::async_trait;
use regex::Regex;

use crate::chat::{ChatMessage, ChatModel};
use crate::error::KbError;
use crate::graph::KnowledgeGraph;
use crate::retriever::{context_block, Retrieved};

const IDENTIFIER_PATTERN: &str = r"(?i)\bCVE-\d{4}-\d+\b";

/// Answers a question using a knowledge graph as context.
#[async_trait]
pub trait GraphQa: Send + Sync {
    async fn answer(&self, query: &str, context: &KnowledgeGraph) -> Result<String, KbError>;
}

pub struct GraphContextQa<'a> {
    chat: &'a dyn ChatModel,
    identifier: Regex,
}

impl<'a> GraphContextQa<'a> {
    pub fn new(chat: &'a dyn ChatModel) -> Result<Self, regex::Error> {
        Ok(Self {
            chat,
            identifier: Regex::new(IDENTIFIER_PATTERN)?,
        })
    }

    /// Identifiers mentioned in `text`, upper-cased, in order of first mention.
    pub fn extract_identifiers(&self, text: &str) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for m in self.identifier.find_iter(text) {
            let id = m.as_str().to_ascii_uppercase();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// One `subject relation object` line per edge of every mentioned
    /// identifier present in the graph.
    pub fn graph_context(&self, query: &str, graph: &KnowledgeGraph) -> String {
        let mut lines: Vec<String> = Vec::new();
        for id in self.extract_identifiers(query) {
            if !graph.contains_vulnerability(&id) {
                tracing::debug!(id = %id, "mentioned identifier not in graph");
                continue;
            }
            lines.extend(graph.triples_for(&id).iter().map(|t| t.to_string()));
        }
        lines.join("\n")
    }
}

#[async_trait]
impl<'a> GraphQa for GraphContextQa<'a> {
    async fn answer(&self, query: &str, context: &KnowledgeGraph) -> Result<String, KbError> {
        let triples = self.graph_context(query, context);
        tracing::info!(
            triples = triples.lines().count(),
            "answering from graph context"
        );
        let messages = vec![
            ChatMessage::system(graph_prompt(&triples)),
            ChatMessage::user(query),
        ];
        self.chat.chat(&messages).await
    }
}

fn graph_prompt(triples: &str) -> String {
    let facts = if triples.is_empty() {
        "(no matching knowledge triplets)"
    } else {
        triples
    };
    format!(
        "Use the following knowledge triplets to answer the question. \
         If they do not contain the answer, say that you don't know.\n\n{}",
        facts
    )
}

/// System prompt for vector RAG, listing each retrieved chunk as ` - chunk`.
pub fn rag_prompt(context: &str) -> String {
    format!(
        "You are a helpful chatbot. Use only the following pieces of context \
         to answer the question if possible. If it's not possible, use your own \
         knowledge but DO NOT make up any new information:\n{}",
        context
    )
}

/// An answer without retrieved context and one with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub before: String,
    pub after: String,
}

/// Ask `chat` the bare question, then ask `qa` with the graph as context.
pub async fn compare_answers(
    chat: &dyn ChatModel,
    qa: &dyn GraphQa,
    query: &str,
    context: &KnowledgeGraph,
) -> Result<Comparison, KbError> {
    let before = chat.chat(&[ChatMessage::user(query)]).await?;
    let after = qa.answer(query, context).await?;
    Ok(Comparison { before, after })
}

/// Ask `chat` the bare question, then again with the chunks in the system prompt.
pub async fn compare_rag(
    chat: &dyn ChatModel,
    query: &str,
    chunks: &[Retrieved],
) -> Result<Comparison, KbError> {
    let before = chat.chat(&[ChatMessage::user(query)]).await?;
    let messages = vec![
        ChatMessage::system(rag_prompt(&context_block(chunks))),
        ChatMessage::user(query),
    ];
    let after = chat.chat(&messages).await?;
    Ok(Comparison { before, after })
}
