//! Conversational context retrieval
//!
//! Queries an external vector-search service for snippets relevant to the
//! transcribed user message. Retrieval is optional: when no service is
//! configured the pipeline runs contextless.

use async_trait::async_trait;

use crate::voice::ContextRetriever;
use crate::{Error, Result};

/// Placeholder context used when the index returns no matches
const NO_CONTEXT: &str = "no relevant context found";

#[derive(serde::Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    user_id: u64,
    top_k: usize,
}

#[derive(serde::Deserialize)]
struct SearchResponse {
    matches: Vec<SearchMatch>,
}

#[derive(serde::Deserialize)]
struct SearchMatch {
    text: String,
    #[allow(dead_code)]
    score: Option<f32>,
}

/// Retrieves context from a vector-search HTTP service
pub struct VectorSearchRetriever {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    top_k: usize,
}

impl VectorSearchRetriever {
    /// Create a new retriever against the given search endpoint
    #[must_use]
    pub fn new(url: String, api_key: Option<String>, top_k: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            api_key,
            top_k,
        }
    }
}

#[async_trait]
impl ContextRetriever for VectorSearchRetriever {
    /// Fetch context snippets for a query, joined into one block
    ///
    /// # Errors
    ///
    /// Returns error if the search service is unreachable or rejects the
    /// request
    async fn retrieve(&self, query: &str, user_id: u64) -> Result<String> {
        let request = SearchRequest {
            query,
            user_id,
            top_k: self.top_k,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(error = %e, "retrieval request failed");
            e
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "retrieval API error");
            return Err(Error::Retrieval(format!(
                "retrieval error {status}: {body}"
            )));
        }

        let result: SearchResponse = response.json().await?;

        if result.matches.is_empty() {
            tracing::debug!(query_chars = query.len(), "no context matches");
            return Ok(NO_CONTEXT.to_string());
        }

        let context = result
            .matches
            .into_iter()
            .map(|m| m.text)
            .collect::<Vec<_>>()
            .join("\n");

        tracing::debug!(context_chars = context.len(), "retrieval complete");
        Ok(context)
    }
}
