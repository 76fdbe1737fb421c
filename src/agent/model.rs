//! Model-call collaborator
//!
//! The companion only ever needs one capability from a language model: turn
//! an ordered list of prompt segments into a reply. Everything else (prompt
//! wording, provider choice, retries) lives behind [`ModelClient`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Role of a prompt segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentRole {
    System,
    User,
    Agent,
}

/// One ordered piece of model input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSegment {
    pub role: SegmentRole,
    pub content: String,
}

impl ContextSegment {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: SegmentRole::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: SegmentRole::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            role: SegmentRole::Agent,
            content: content.into(),
        }
    }
}

/// Generates a reply from ordered prompt segments
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// # Errors
    ///
    /// Returns `Error::Model` when the provider fails or replies with nothing usable
    async fn generate(&self, segments: &[ContextSegment]) -> Result<String>;
}

/// Chat-completions client for any `OpenAI`-compatible endpoint
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
}

impl OpenAiChatClient {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            max_tokens: 1024,
        })
    }

    /// Override the completion token cap
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

const fn wire_role(role: SegmentRole) -> &'static str {
    match role {
        SegmentRole::System => "system",
        SegmentRole::User => "user",
        SegmentRole::Agent => "assistant",
    }
}

/// Pull the first non-empty reply out of a chat-completions body
fn first_reply(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .filter_map(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .find(|c| !c.is_empty())
        .ok_or_else(|| Error::Model("empty completion".to_string()))
}

#[async_trait]
impl ModelClient for OpenAiChatClient {
    async fn generate(&self, segments: &[ContextSegment]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: segments
                .iter()
                .map(|s| ChatMessage {
                    role: wire_role(s.role),
                    content: &s.content,
                })
                .collect(),
            max_tokens: self.max_tokens,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Model(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Model(format!("completion API error {status}: {body}")));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Model(format!("malformed completion: {e}")))?;

        let reply = first_reply(body)?;
        tracing::debug!(model = %self.model, chars = reply.len(), "model reply received");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_role_maps_to_assistant() {
        assert_eq!(wire_role(SegmentRole::Agent), "assistant");
        assert_eq!(wire_role(SegmentRole::System), "system");
    }

    #[test]
    fn first_reply_skips_blank_choices() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"   "}},{"message":{"content":" hi there "}}]}"#,
        )
        .unwrap();
        assert_eq!(first_reply(body).unwrap(), "hi there");
    }

    #[test]
    fn empty_completion_is_model_error() {
        let body: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(matches!(first_reply(body), Err(Error::Model(_))));
    }
}
