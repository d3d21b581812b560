//! Text generation boundary and the Gemini `generateContent` client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use zonerag_core::config::GenerationConfig;
use zonerag_core::error::ServiceErrorKind;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("generation {kind} failure: {message}")]
pub struct GenerationError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl GenerationError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self { kind: ServiceErrorKind::Transient, message: message.into() }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self { kind: ServiceErrorKind::Permanent, message: message.into() }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self { kind: ServiceErrorKind::Timeout, message: message.into() }
    }
}

/// Prompt in, free text out.
#[async_trait]
pub trait GenerationService: Send + Sync {
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

pub struct GeminiGenerator {
    client: Client,
    endpoint: String,
    model: String,
}

impl GeminiGenerator {
    pub fn new(api_key: &str, config: &GenerationConfig) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Gemini API key");
        anyhow::ensure!(!config.model.trim().is_empty(), "missing generation model name");
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", HeaderValue::from_str(api_key.trim()).context("invalid Gemini API key")?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .context("failed to build Gemini HTTP client")?;
        let model = config.model.trim().trim_start_matches("models/").to_string();
        let endpoint = format!("{}/models/{}:generateContent", config.endpoint.trim_end_matches('/'), model);
        Ok(Self { client, endpoint, model })
    }

    /// Key from `generation.api_key`, else `GEMINI_API_KEY`.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .context("no generation API key: set APP_GENERATION__API_KEY or GEMINI_API_KEY")?;
        Self::new(&api_key, config)
    }
}

#[async_trait]
impl GenerationService for GeminiGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = GenerateRequest { contents: vec![Content { parts: vec![Part { text: prompt }] }] };
        let resp = self.client.post(&self.endpoint).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::timeout(e.to_string())
            } else if e.is_connect() || e.is_request() {
                GenerationError::transient(e.to_string())
            } else {
                GenerationError::permanent(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = format!("Gemini returned {status}: {}", text.chars().take(300).collect::<String>());
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            return Err(if retryable { GenerationError::transient(message) } else { GenerationError::permanent(message) });
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::permanent(format!("failed to parse Gemini response: {e}")))?;
        parsed.first_text().ok_or_else(|| GenerationError::permanent("no text in model response"))
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
            .filter(|t| !t.trim().is_empty())
    }
}
