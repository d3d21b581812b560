//! Gemini `batchEmbedContents` client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use zonerag_core::config::EmbeddingConfig;

use crate::service::{EmbedTask, EmbeddingService, ServiceFailure};

pub struct GeminiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    id: String,
}

impl GeminiEmbedder {
    pub fn new(api_key: &str, config: &EmbeddingConfig) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Gemini API key");
        anyhow::ensure!(!config.model.trim().is_empty(), "missing embedding model name");
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", HeaderValue::from_str(api_key.trim()).context("invalid Gemini API key")?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .context("failed to build Gemini HTTP client")?;
        let model = config.model.trim().trim_start_matches("models/").to_string();
        let endpoint = format!("{}/models/{}:batchEmbedContents", config.endpoint.trim_end_matches('/'), model);
        let id = match config.dimensions {
            Some(d) => format!("gemini:{model}:d{d}"),
            None => format!("gemini:{model}"),
        };
        Ok(Self { client, endpoint, model, dimensions: config.dimensions, id })
    }
}

#[async_trait]
impl EmbeddingService for GeminiEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    async fn embed_batch(&self, texts: &[String], task: EmbedTask) -> Result<Vec<Vec<f32>>, ServiceFailure> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = format!("models/{}", self.model);
        let task_type = match task {
            EmbedTask::Document => "RETRIEVAL_DOCUMENT",
            EmbedTask::Query => "RETRIEVAL_QUERY",
        };
        let body = BatchRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: &model,
                    content: Content { parts: vec![Part { text }] },
                    task_type,
                    output_dimensionality: self.dimensions,
                })
                .collect(),
        };

        let resp = self.client.post(&self.endpoint).json(&body).send().await.map_err(classify_transport)?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
            let message = format!("Gemini returned {status}: {}", truncate(&text, 300));
            return Err(if is_retryable_status(status) {
                ServiceFailure::transient(message)
            } else {
                ServiceFailure::permanent(message)
            });
        }
        let parsed: BatchResponse = resp
            .json()
            .await
            .map_err(|e| ServiceFailure::permanent(format!("failed to parse Gemini embedding response: {e}")))?;
        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT || status.is_server_error()
}

fn classify_transport(err: reqwest::Error) -> ServiceFailure {
    if err.is_timeout() {
        ServiceFailure::timeout(err.to_string())
    } else if err.is_connect() || err.is_request() || err.is_body() {
        ServiceFailure::transient(err.to_string())
    } else {
        ServiceFailure::permanent(err.to_string())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn request_shape_matches_api() {
        let text = "Minimum lot size".to_string();
        let body = BatchRequest {
            requests: vec![EmbedRequest {
                model: "models/gemini-embedding-001",
                content: Content { parts: vec![Part { text: &text }] },
                task_type: "RETRIEVAL_QUERY",
                output_dimensionality: None,
            }],
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["requests"][0]["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(json["requests"][0]["content"]["parts"][0]["text"], "Minimum lot size");
        assert!(json["requests"][0].get("outputDimensionality").is_none());
    }

    #[test]
    fn embedder_id_includes_model() {
        let config = EmbeddingConfig { dimensions: Some(768), ..EmbeddingConfig::default() };
        let e = GeminiEmbedder::new("key", &config).expect("client");
        assert_eq!(e.embedder_id(), "gemini:gemini-embedding-001:d768");
        assert!(GeminiEmbedder::new(" ", &config).is_err());
    }
}
