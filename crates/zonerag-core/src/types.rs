//! Domain types flowing through chunking, indexing, retrieval and evaluation.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MalformedInputError;

pub type ChunkId = String;

/// One table extracted from a page: rows of cell text.
pub type TableGrid = Vec<Vec<String>>;

/// A regulation document as produced by the extraction collaborator.
///
/// Older extraction runs wrote `regulation` instead of `document_id` and
/// `page` instead of `number`; both spellings are accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedDocument {
    pub city: String,
    #[serde(alias = "regulation")]
    pub document_id: String,
    #[serde(default)]
    pub zoning_label: Option<String>,
    pub pages: Vec<ParsedPage>,
}

impl ParsedDocument {
    /// Reject records missing the provenance every chunk must carry.
    pub fn validate(&self) -> Result<(), MalformedInputError> {
        let location = if self.document_id.trim().is_empty() { "<unnamed document>" } else { self.document_id.as_str() };
        if self.document_id.trim().is_empty() {
            return Err(MalformedInputError::new(location, "document_id is empty"));
        }
        if self.city.trim().is_empty() {
            return Err(MalformedInputError::new(location, "city is empty"));
        }
        if self.pages.is_empty() {
            return Err(MalformedInputError::new(location, "document has no pages"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedPage {
    #[serde(alias = "page")]
    pub number: u32,
    pub text: String,
    #[serde(default)]
    pub tables: Vec<TableGrid>,
}

impl ParsedPage {
    /// Page text with tables rendered after it, one row per line.
    ///
    /// Tables go after the body so the body's line numbers stay valid.
    pub fn full_text(&self) -> Cow<'_, str> {
        let rows: Vec<String> = self
            .tables
            .iter()
            .flat_map(|table| table.iter())
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .map(|row| row.iter().map(|c| c.trim()).collect::<Vec<_>>().join(" | "))
            .collect();
        if rows.is_empty() {
            return Cow::Borrowed(&self.text);
        }
        let mut out = self.text.trim_end().to_string();
        out.push_str("\n\n");
        out.push_str(&rows.join("\n"));
        Cow::Owned(out)
    }
}

/// Inclusive 1-based line span within a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A token-bounded, page-scoped excerpt of a regulation document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub token_count: usize,
    pub city: String,
    pub zoning_label: Option<String>,
    pub source_document_id: String,
    pub page_number: u32,
    pub line_range: LineRange,
    /// Byte offsets into the page text (tables included).
    pub byte_range: (usize, usize),
    /// Position of this chunk within its page.
    pub chunk_index: usize,
}

impl Chunk {
    /// First `max_chars` bytes of the text, cut on a char boundary.
    pub fn preview(&self, max_chars: usize) -> &str {
        if self.text.len() <= max_chars {
            return &self.text;
        }
        let mut end = max_chars;
        while end > 0 && !self.text.is_char_boundary(end) {
            end -= 1;
        }
        &self.text[..end]
    }

    pub fn citation(&self, score: f32, excerpt_chars: usize) -> Citation {
        Citation {
            chunk_id: self.id.clone(),
            source_document_id: self.source_document_id.clone(),
            page_number: self.page_number,
            line_range: self.line_range,
            score,
            excerpt: self.preview(excerpt_chars).to_string(),
        }
    }
}

/// A search hit: the chunk and its cosine similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Pointer back into a source document supporting a verdict or answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    pub chunk_id: ChunkId,
    pub source_document_id: String,
    pub page_number: u32,
    pub line_range: LineRange,
    pub score: f32,
    pub excerpt: String,
}

/// Property facts resolved by the assessor lookup. Any field but the address
/// may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PropertyContext {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default, alias = "zoning")]
    pub zoning_label: Option<String>,
    /// Square feet.
    #[serde(default, alias = "lot_size_sqft")]
    pub lot_size: Option<f64>,
    #[serde(default)]
    pub existing_units: Option<u32>,
    #[serde(default)]
    pub is_historic: Option<bool>,
}

impl PropertyContext {
    pub fn city(&self) -> Option<&str> {
        self.city.as_deref().filter(|c| !c.trim().is_empty())
    }

    pub fn zoning_label(&self) -> Option<&str> {
        self.zoning_label.as_deref().filter(|z| !z.trim().is_empty())
    }
}

/// Canonical form used when comparing city names ("San Francisco" ==
/// "san_francisco").
pub fn normalize_city(city: &str) -> String {
    city.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("_")
}
