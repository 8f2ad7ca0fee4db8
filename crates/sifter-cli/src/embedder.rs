//! OpenAI-compatible embeddings client
//!
//! Works against any server exposing `POST {base_url}/embeddings` with the
//! OpenAI request shape (OpenAI itself, Ollama's `/v1`, vLLM, LM Studio).
//! Requests carry no client-side deadline and are never retried: a failed
//! batch fails the run, a slow one is waited for.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sifter_core::{Embedder, Embedding, SifterError, SifterResult};
use tracing::debug;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Embedder backed by an HTTP embeddings endpoint
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpEmbedder {
    /// Client for `base_url` (trailing slashes are ignored)
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> Option<usize> {
        None
    }

    async fn embed(&self, texts: &[String]) -> SifterResult<Vec<Embedding>> {
        let url = self.endpoint();
        let mut request = self
            .client
            .post(&url)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            SifterError::processing_with_source(format!("embedding request to {url} failed"), e)
                .with_hint("check --embed-url and that the embedding server is running")
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SifterError::processing(format!(
                "embedding API error ({status}): {body}"
            )));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            SifterError::processing_with_source("failed to parse embedding response", e)
        })?;
        debug!(batch = texts.len(), vectors = parsed.data.len(), "embedded batch");

        Ok(into_ordered(parsed.data))
    }
}

/// Vectors in request order; servers may return `data` in any order
fn into_ordered(mut data: Vec<EmbeddingData>) -> Vec<Embedding> {
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    data.into_iter().map(|d| Embedding(d.embedding)).collect()
}
