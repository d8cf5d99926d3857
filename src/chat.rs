//! Chat-completion collaborators.
//!
//! The [`ChatModel`] trait takes an ordered list of role-tagged messages and
//! returns the assistant's reply. Providers mirror the embedding module:
//! `"ollama"` posts to `/api/chat` with streaming off, `"openai"` posts to
//! `/v1/chat/completions`, and `"disabled"` fails every call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ChatConfig;
use crate::embedding::openai_api_key;
use crate::error::KbError;
use crate::http::{join_url, JsonEndpoint};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, KbError>;
}

pub struct DisabledChat;

#[async_trait]
impl ChatModel for DisabledChat {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, KbError> {
        Err(KbError::unavailable(
            "chat",
            "chat",
            last_user_content(messages),
            "chat provider is disabled; set [chat] provider in the config",
        ))
    }
}

pub struct OllamaChat {
    model: String,
    endpoint: JsonEndpoint,
}

impl OllamaChat {
    pub fn new(config: &ChatConfig) -> Result<Self, KbError> {
        let base = config.url.as_deref().unwrap_or("http://localhost:11434");
        let endpoint = JsonEndpoint::new(
            "ollama",
            join_url(base, "/api/chat"),
            None,
            config.timeout_secs,
            config.max_retries,
        )?;
        Ok(Self {
            model: config.model.clone(),
            endpoint,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, KbError> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });
        let response = self
            .endpoint
            .post("chat", last_user_content(messages), &body)
            .await?;
        reply_text(self.endpoint.service(), response.pointer("/message/content"))
    }
}

pub struct OpenAIChat {
    model: String,
    endpoint: JsonEndpoint,
}

impl OpenAIChat {
    pub fn new(config: &ChatConfig) -> Result<Self, KbError> {
        let api_key = openai_api_key()?;
        let base = config.url.as_deref().unwrap_or("https://api.openai.com");
        let endpoint = JsonEndpoint::new(
            "openai",
            join_url(base, "/v1/chat/completions"),
            Some(api_key),
            config.timeout_secs,
            config.max_retries,
        )?;
        Ok(Self {
            model: config.model.clone(),
            endpoint,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, KbError> {
        let body = json!({
            "model": self.model,
            "messages": messages,
        });
        let response = self
            .endpoint
            .post("chat", last_user_content(messages), &body)
            .await?;
        reply_text(
            self.endpoint.service(),
            response.pointer("/choices/0/message/content"),
        )
    }
}

fn last_user_content(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

fn reply_text(service: &str, content: Option<&Value>) -> Result<String, KbError> {
    content
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| KbError::InvalidResponse {
            service: service.to_string(),
            reason: "missing message content".to_string(),
        })
}

pub fn create_chat_model(config: &ChatConfig) -> anyhow::Result<Box<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledChat)),
        "ollama" => Ok(Box::new(OllamaChat::new(config)?)),
        "openai" => Ok(Box::new(OpenAIChat::new(config)?)),
        other => anyhow::bail!("Unknown chat provider: {}", other),
    }
}
