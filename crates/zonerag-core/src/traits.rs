use crate::error::MalformedInputError;
use crate::types::Citation;

/// Byte span of one token within the tokenized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSpan {
    pub start: usize,
    pub end: usize,
}

/// Deterministic text → token spans. Same input, same spans, every time.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Result<Vec<TokenSpan>, MalformedInputError>;

    fn count(&self, text: &str) -> Result<usize, MalformedInputError> {
        self.tokenize(text).map(|spans| spans.len())
    }
}

/// Pre-fetched citations keyed by topic, scoped to one property.
///
/// Implemented by the retrieval layer so rule evaluation itself never touches
/// the network.
pub trait CitationSource {
    fn citations_for(&self, topic: &str) -> &[Citation];
}
