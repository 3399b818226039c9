//! LLM client abstraction.
//!
//! # Implementations
//! - [`openai::OpenAiClient`]: OpenAI chat completions via `async-openai`.

pub mod openai;

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::Result;

/// A chat message for the LLM conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Speaker role in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Text-generation provider used by the extraction engine.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the conversation and return the assistant's reply as plain text.
    async fn generate(&self, messages: &[Message]) -> Result<String>;
}
