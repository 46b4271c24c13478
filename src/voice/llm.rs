//! LLM reply generation

use async_trait::async_trait;

use crate::voice::Generator;
use crate::{Error, Result};

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Use the provided context to answer the user's question.";

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(serde::Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Generates assistant replies via an OpenAI-compatible chat API
pub struct ChatGenerator {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl ChatGenerator {
    /// Create a new chat generation client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_base: String, api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "API key required for chat generation".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_base,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl Generator for ChatGenerator {
    /// Generate a reply grounded in the retrieved context
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the reply is empty
    async fn generate(&self, message: &str, context: &str) -> Result<String> {
        let prompt = format!("Context: {context}\n\nUser: {message}\nAssistant:");

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat API error");
            return Err(Error::Llm(format!("chat error {status}: {body}")));
        }

        let result: ChatResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse chat response");
            e
        })?;

        let reply = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if reply.is_empty() {
            return Err(Error::Llm("chat API returned empty reply".to_string()));
        }

        tracing::debug!(reply_chars = reply.len(), "generation complete");
        Ok(reply)
    }
}
