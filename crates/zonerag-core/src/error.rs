//! Error taxonomy shared by every pipeline stage.
//!
//! Page- and chunk-level problems surface as [`MalformedInputError`] and are
//! skipped by the caller. Everything else is returned to the caller typed, so
//! "nothing matched" can always be told apart from "could not search".

use std::fmt;
use std::ops::Range;

use thiserror::Error;

/// A parsed record (document, page or query) did not have the expected shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed input at {location}: {reason}")]
pub struct MalformedInputError {
    pub location: String,
    pub reason: String,
}

impl MalformedInputError {
    pub fn new(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { location: location.into(), reason: reason.into() }
    }
}

/// How an embedding call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// Rate limit, 5xx, dropped connection. Worth retrying.
    Transient,
    /// Auth, quota, bad request, malformed response. Retrying will not help.
    Permanent,
    /// The caller's deadline expired before the service answered.
    Timeout,
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// The embedding service could not produce vectors for a batch.
///
/// `input_range` indexes into the caller's original input sequence, so a
/// resumed run can start at `input_range.start` instead of re-embedding
/// everything.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "embedding service {kind} failure on batch {batch_index} (inputs {}..{}) after {attempts} attempt(s): {message}",
    input_range.start,
    input_range.end
)]
pub struct EmbeddingServiceError {
    pub kind: ServiceErrorKind,
    pub batch_index: usize,
    pub input_range: Range<usize>,
    pub attempts: u32,
    pub message: String,
}

impl EmbeddingServiceError {
    pub fn resume_offset(&self) -> usize {
        self.input_range.start
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == ServiceErrorKind::Permanent
    }
}

/// No index has been built or published yet, or the published one is empty.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("index not ready: {reason}")]
pub struct IndexNotReadyError {
    pub reason: String,
}

impl IndexNotReadyError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// The static rule table is inconsistent. Fatal at startup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("rule configuration error{}: {reason}", rule.as_ref().map(|r| format!(" in '{r}'")).unwrap_or_default())]
pub struct RuleConfigurationError {
    pub rule: Option<String>,
    pub reason: String,
}

impl RuleConfigurationError {
    pub fn new(rule: Option<&str>, reason: impl Into<String>) -> Self {
        Self { rule: rule.map(str::to_string), reason: reason.into() }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    MalformedInput(#[from] MalformedInputError),

    #[error(transparent)]
    EmbeddingService(#[from] EmbeddingServiceError),

    #[error(transparent)]
    IndexNotReady(#[from] IndexNotReadyError),

    #[error(transparent)]
    RuleConfiguration(#[from] RuleConfigurationError),

    #[error("query vector has dimension {found}, index expects {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
