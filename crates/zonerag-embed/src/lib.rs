//! zonerag-embed
//!
//! Maps chunk and query text to vectors through an external embedding
//! service. [`EmbeddingAdapter`] owns batching, per-call timeouts, retries and
//! response validation; services make one attempt per call.

use std::sync::Arc;

use anyhow::{anyhow, Result};

use zonerag_core::config::{EmbeddingConfig, EmbeddingProvider};

pub mod adapter;
pub mod fake;
pub mod gemini;
pub mod service;

pub use adapter::{EmbeddingAdapter, RetryPolicy};
pub use fake::FakeEmbedder;
pub use gemini::GeminiEmbedder;
pub use service::{EmbedTask, EmbeddingService, ServiceFailure};

/// `APP_USE_FAKE_EMBEDDINGS=1` (or `true`) forces the fake embedder.
pub fn use_fake_from_env() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Build the configured embedding service.
///
/// The Gemini key comes from `embedding.api_key` (`APP_EMBEDDING__API_KEY`),
/// falling back to `GEMINI_API_KEY`.
pub fn service_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingService>> {
    if config.dimensions == Some(0) {
        anyhow::bail!("embedding.dimensions must be positive");
    }
    if use_fake_from_env() || config.provider == EmbeddingProvider::Fake {
        let dim = config.dimensions.unwrap_or(256);
        tracing::info!(target: "embed", "using fake embedder (d={dim})");
        return Ok(Arc::new(FakeEmbedder::new(dim)));
    }
    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .or_else(|| std::env::var("GEMINI_API_KEY").ok())
        .ok_or_else(|| anyhow!("no embedding API key: set APP_EMBEDDING__API_KEY or GEMINI_API_KEY"))?;
    let embedder = GeminiEmbedder::new(&api_key, config)?;
    tracing::info!(target: "embed", "using {}", embedder.embedder_id());
    Ok(Arc::new(embedder))
}
