use std::io;
use std::path::PathBuf;

use thiserror::Error;

use zonerag_core::error::EmbeddingServiceError;

/// Why a batch index build was aborted. Nothing is published or written when
/// one of these is returned.
#[derive(Debug, Error)]
pub enum IndexBuildError {
    #[error("no chunks to index")]
    Empty,

    #[error("duplicate chunk id {0}")]
    DuplicateChunkId(String),

    #[error("chunk {chunk_id}: vector has dimension {found}, index expects {expected}")]
    DimensionMismatch { chunk_id: String, expected: usize, found: usize },

    #[error("chunk {chunk_id}: {reason}")]
    InvalidVector { chunk_id: String, reason: String },

    #[error(transparent)]
    Embedding(#[from] EmbeddingServiceError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// The persisted index file could not be written or read back.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("not an index artifact (bad magic)")]
    BadMagic,

    #[error("unsupported artifact format version {0}")]
    UnsupportedVersion(u32),

    #[error("artifact truncated: {0}")]
    Truncated(String),

    #[error("artifact checksum mismatch")]
    ChecksumMismatch,

    #[error("artifact metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("artifact inconsistent: {0}")]
    Inconsistent(String),
}

impl ArtifactError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
