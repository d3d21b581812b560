//! The embedding service boundary: ordered UTF-8 strings in, one vector per
//! string out, failures classified so the adapter knows what to retry.

use async_trait::async_trait;
use thiserror::Error;

use zonerag_core::error::ServiceErrorKind;

/// What the vectors will be used for. Services that distinguish document and
/// query embeddings get the right task type; others ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedTask {
    Document,
    Query,
}

/// One failed call to an embedding service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ServiceFailure {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self { kind: ServiceErrorKind::Transient, message: message.into() }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self { kind: ServiceErrorKind::Permanent, message: message.into() }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self { kind: ServiceErrorKind::Timeout, message: message.into() }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind != ServiceErrorKind::Permanent
    }
}

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Stable identifier for the provider/model, recorded in index artifacts.
    fn embedder_id(&self) -> &str;

    /// Embed one batch. Implementations make a single attempt; retrying is the
    /// adapter's job.
    async fn embed_batch(&self, texts: &[String], task: EmbedTask) -> Result<Vec<Vec<f32>>, ServiceFailure>;
}
