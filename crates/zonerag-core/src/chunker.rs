//! Page-scoped, token-bounded chunking with exact overlap.
//!
//! For each page the tokenizer yields byte spans. A chunk grows to
//! `max_tokens`; if a sentence end or line break sits inside the lookback
//! window the cut moves back to it, otherwise the cut is hard. The next chunk
//! starts `overlap_tokens` before the cut. Chunks never cross pages, and the
//! last chunk of a page may fall short of `min_tokens`.

use std::collections::HashSet;

use regex::Regex;

use crate::config::ChunkingConfig;
use crate::error::{Error, MalformedInputError};
use crate::tokenize::WordTokenizer;
use crate::traits::{TokenSpan, Tokenizer};
use crate::types::{normalize_city, Chunk, LineRange, ParsedDocument, ParsedPage};

/// Chunks produced for one document, plus the pages that had to be skipped.
#[derive(Debug, Clone, Default)]
pub struct ChunkedDocument {
    pub document_id: String,
    pub chunks: Vec<Chunk>,
    pub skipped: Vec<MalformedInputError>,
}

pub struct Chunker<T: Tokenizer = WordTokenizer> {
    tokenizer: T,
    config: ChunkingConfig,
    zoning_tagger: Option<ZoningTagger>,
}

impl Chunker<WordTokenizer> {
    pub fn new(config: ChunkingConfig) -> Result<Self, Error> {
        Self::with_tokenizer(WordTokenizer, config)
    }
}

impl<T: Tokenizer> Chunker<T> {
    pub fn with_tokenizer(tokenizer: T, config: ChunkingConfig) -> Result<Self, Error> {
        config.validate()?;
        let zoning_tagger = ZoningTagger::new(&config.zoning_codes)?;
        Ok(Self { tokenizer, config, zoning_tagger })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Chunk every page of `doc`. Bad pages are logged and skipped; a bad
    /// document yields no chunks and one skip entry.
    pub fn chunk(&self, doc: &ParsedDocument) -> ChunkedDocument {
        let mut out = ChunkedDocument { document_id: doc.document_id.clone(), ..Default::default() };
        if let Err(e) = doc.validate() {
            tracing::warn!(target: "chunker", "skipping document: {e}");
            out.skipped.push(e);
            return out;
        }

        let mut seen_pages = HashSet::new();
        for page in &doc.pages {
            if !seen_pages.insert(page.number) {
                let e = MalformedInputError::new(page_location(doc, page), "duplicate page number");
                tracing::warn!(target: "chunker", "skipping page: {e}");
                out.skipped.push(e);
                continue;
            }
            match self.chunk_page(doc, page) {
                Ok(chunks) => out.chunks.extend(chunks),
                Err(e) => {
                    tracing::warn!(target: "chunker", "skipping page: {e}");
                    out.skipped.push(e);
                }
            }
        }
        tracing::debug!(
            target: "chunker",
            "{}: {} pages -> {} chunks ({} skipped)",
            doc.document_id,
            doc.pages.len(),
            out.chunks.len(),
            out.skipped.len()
        );
        out
    }

    pub fn chunk_page(&self, doc: &ParsedDocument, page: &ParsedPage) -> Result<Vec<Chunk>, MalformedInputError> {
        let location = page_location(doc, page);
        let text = page.full_text();
        if text.trim().is_empty() {
            return Err(MalformedInputError::new(location, "page has no text"));
        }
        let spans = self
            .tokenizer
            .tokenize(&text)
            .map_err(|e| MalformedInputError::new(location.clone(), format!("token count unavailable: {}", e.reason)))?;
        if spans.is_empty() {
            return Err(MalformedInputError::new(location, "page has no tokens"));
        }

        let lines = LineIndex::new(&text);
        let max = self.config.max_tokens();
        let min = self.config.min_tokens();
        let overlap = self.config.overlap_tokens;

        let mut chunks = Vec::new();
        let mut start = 0usize;
        loop {
            let remaining = spans.len() - start;
            let cut = if remaining <= max { spans.len() } else { find_cut(&text, &spans, start + min, start + max) };

            let byte_start = spans[start].start;
            let byte_end = spans[cut - 1].end;
            let chunk_text = &text[byte_start..byte_end];
            let zoning_label = doc
                .zoning_label
                .clone()
                .filter(|z| !z.trim().is_empty())
                .or_else(|| self.zoning_tagger.as_ref().and_then(|t| t.tag(chunk_text)));

            chunks.push(Chunk {
                id: chunk_id(&doc.city, &doc.document_id, page.number, byte_start, byte_end),
                text: chunk_text.to_string(),
                token_count: cut - start,
                city: doc.city.trim().to_string(),
                zoning_label,
                source_document_id: doc.document_id.clone(),
                page_number: page.number,
                line_range: LineRange { start: lines.line_of(byte_start), end: lines.line_of(byte_end - 1) },
                byte_range: (byte_start, byte_end),
                chunk_index: chunks.len(),
            });

            if cut == spans.len() {
                break;
            }
            // cut - start >= min > overlap, so this always moves forward.
            start = cut - overlap;
        }
        Ok(chunks)
    }
}

/// Chunk one document with the given budget and default lookback.
pub fn chunk(doc: &ParsedDocument, target_tokens: usize, overlap_tokens: usize) -> Result<ChunkedDocument, Error> {
    Ok(Chunker::new(ChunkingConfig::new(target_tokens, overlap_tokens))?.chunk(doc))
}

/// Stable id: hash of normalized city, document, page and byte range.
pub fn chunk_id(city: &str, document_id: &str, page_number: u32, byte_start: usize, byte_end: usize) -> String {
    let city = normalize_city(city);
    let key = format!("{city}\u{1f}{document_id}\u{1f}{page_number}\u{1f}{byte_start}-{byte_end}");
    blake3::hash(key.as_bytes()).to_hex()[..16].to_string()
}

fn page_location(doc: &ParsedDocument, page: &ParsedPage) -> String {
    format!("{} page {}", doc.document_id, page.number)
}

/// Largest `i` in `[lo, hi]` with a boundary right before token `i`; `hi`
/// (the hard cut) when there is none.
fn find_cut(text: &str, spans: &[TokenSpan], lo: usize, hi: usize) -> usize {
    (lo..=hi).rev().find(|&i| is_boundary_before(text, spans, i)).unwrap_or(hi)
}

fn is_boundary_before(text: &str, spans: &[TokenSpan], i: usize) -> bool {
    if i == 0 || i >= spans.len() {
        return false;
    }
    let prev = spans[i - 1];
    let gap = &text[prev.end..spans[i].start];
    gap.contains('\n') || matches!(&text[prev.start..prev.end], "." | "!" | "?" | ";")
}

/// Byte offset -> 1-based line number.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> u32 {
        self.starts.partition_point(|&s| s <= offset) as u32
    }
}

/// Tags a chunk with the single configured zoning code it mentions.
///
/// Codes are tried longest first so `RH-1(D)` wins over `RH-1`. A match only
/// counts when it is not glued to a neighbouring word character or hyphen.
struct ZoningTagger {
    pattern: Regex,
}

impl ZoningTagger {
    fn new(codes: &[String]) -> Result<Option<Self>, Error> {
        let mut codes: Vec<&str> = codes.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).collect();
        if codes.is_empty() {
            return Ok(None);
        }
        codes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        codes.dedup();
        let alternatives: Vec<String> = codes.into_iter().map(regex::escape).collect();
        let pattern = Regex::new(&format!("(?:{})", alternatives.join("|")))
            .map_err(|e| Error::InvalidConfig(format!("chunking.zoning_codes: {e}")))?;
        Ok(Some(Self { pattern }))
    }

    fn tag(&self, text: &str) -> Option<String> {
        let found: HashSet<&str> = self
            .pattern
            .find_iter(text)
            .filter(|m| {
                let before = text[..m.start()].chars().next_back();
                let after = text[m.end()..].chars().next();
                !before.is_some_and(is_code_char) && !after.is_some_and(is_code_char)
            })
            .map(|m| m.as_str())
            .collect();
        if found.len() == 1 {
            found.into_iter().next().map(str::to_string)
        } else {
            None
        }
    }
}

fn is_code_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}
