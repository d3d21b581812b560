use std::path::Path;

use anyhow::anyhow;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::MalformedInputError;
use crate::traits::{TokenSpan, Tokenizer};

/// Unicode word-boundary tokenizer. Every non-whitespace segment is a token,
/// so punctuation such as `.` counts on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<TokenSpan>, MalformedInputError> {
        Ok(text
            .split_word_bound_indices()
            .filter(|(_, seg)| !seg.trim().is_empty())
            .map(|(start, seg)| TokenSpan { start, end: start + seg.len() })
            .collect())
    }
}

/// Subword tokenizer backed by a HuggingFace `tokenizer.json`.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", path.display(), e))?;
        Ok(Self { inner })
    }
}

impl Tokenizer for HfTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<TokenSpan>, MalformedInputError> {
        let enc = self
            .inner
            .encode(text, false)
            .map_err(|e| MalformedInputError::new("tokenizer", format!("tokenization failed: {e}")))?;
        let mut spans: Vec<TokenSpan> = Vec::with_capacity(enc.get_offsets().len());
        for &(start, end) in enc.get_offsets() {
            if end <= start {
                continue;
            }
            if end > text.len() || !text.is_char_boundary(start) || !text.is_char_boundary(end) {
                return Err(MalformedInputError::new("tokenizer", format!("offset {start}..{end} is not a valid byte span")));
            }
            // Byte-level BPE can emit several tokens for one character; keep
            // spans strictly increasing so chunk slicing stays well defined.
            match spans.last_mut() {
                Some(prev) if start < prev.end => prev.end = prev.end.max(end),
                _ => spans.push(TokenSpan { start, end }),
            }
        }
        Ok(spans)
    }
}
