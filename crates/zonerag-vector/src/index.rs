//! Exact cosine-similarity index over L2-normalized vectors.
//!
//! A `VectorIndex` is immutable once built: vectors live in one flat buffer,
//! row `i` pairs with `chunks[i]`, and rows keep insertion order so equal
//! scores rank by position.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use zonerag_core::error::{Error, IndexNotReadyError, MalformedInputError};
use zonerag_core::types::{Chunk, ScoredChunk};

use crate::error::IndexBuildError;
use crate::filter::ChunkFilter;

/// Chunk metadata plus its embedding, stored together.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHeader {
    pub embedder_id: String,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    header: IndexHeader,
    dim: usize,
    chunks: Vec<Chunk>,
    vectors: Vec<f32>,
}

impl VectorIndex {
    /// Validate and normalize `entries` into a new index.
    pub fn build(embedder_id: &str, entries: Vec<IndexEntry>) -> Result<Self, IndexBuildError> {
        let dim = entries.first().map(|e| e.vector.len()).unwrap_or(0);
        let mut seen = HashSet::with_capacity(entries.len());
        let mut chunks = Vec::with_capacity(entries.len());
        let mut vectors = Vec::with_capacity(entries.len() * dim);
        for IndexEntry { chunk, mut vector } in entries {
            if !seen.insert(chunk.id.clone()) {
                return Err(IndexBuildError::DuplicateChunkId(chunk.id));
            }
            if vector.len() != dim || dim == 0 {
                return Err(IndexBuildError::DimensionMismatch { chunk_id: chunk.id, expected: dim, found: vector.len() });
            }
            normalize(&mut vector).map_err(|reason| IndexBuildError::InvalidVector { chunk_id: chunk.id.clone(), reason })?;
            vectors.extend_from_slice(&vector);
            chunks.push(chunk);
        }
        let header = IndexHeader { embedder_id: embedder_id.to_string(), built_at: Utc::now() };
        tracing::debug!(target: "vector", "built index: {} entries, d={dim}", chunks.len());
        Ok(Self { header, dim, chunks, vectors })
    }

    /// Reassemble an index from already-normalized parts (artifact loading).
    pub(crate) fn from_parts(header: IndexHeader, dim: usize, chunks: Vec<Chunk>, vectors: Vec<f32>) -> Self {
        Self { header, dim, chunks, vectors }
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub fn embedder_id(&self) -> &str {
        &self.header.embedder_id
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.header.built_at
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub(crate) fn raw_vectors(&self) -> &[f32] {
        &self.vectors
    }

    pub fn vector(&self, i: usize) -> Option<&[f32]> {
        (i < self.chunks.len()).then(|| &self.vectors[i * self.dim..(i + 1) * self.dim])
    }

    /// Top-`k` chunks passing `filter`, by descending cosine similarity.
    /// The filter runs before the cut, so fewer than `k` hits means fewer than
    /// `k` chunks matched.
    pub fn search<F>(&self, query: &[f32], k: usize, filter: &F) -> Result<Vec<ScoredChunk>, Error>
    where
        F: ChunkFilter + ?Sized,
    {
        if self.is_empty() {
            return Err(IndexNotReadyError::new("index is empty").into());
        }
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, found: query.len() });
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut q = query.to_vec();
        normalize(&mut q).map_err(|reason| MalformedInputError::new("query vector", reason))?;

        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| filter.matches(chunk))
            .map(|(i, _)| (i, dot(&q, &self.vectors[i * self.dim..(i + 1) * self.dim])))
            .collect();
        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk { chunk: self.chunks[i].clone(), score })
            .collect())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn normalize(v: &mut [f32]) -> Result<(), String> {
    if v.iter().any(|x| !x.is_finite()) {
        return Err("vector has non-finite components".to_string());
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return Err("vector has zero norm".to_string());
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonerag_core::types::LineRange;

    fn chunk(id: &str) -> Chunk {
        Chunk {
            id: id.into(),
            text: id.into(),
            token_count: 1,
            city: "Oakland".into(),
            zoning_label: None,
            source_document_id: "doc".into(),
            page_number: 1,
            line_range: LineRange { start: 1, end: 1 },
            byte_range: (0, 1),
            chunk_index: 0,
        }
    }

    fn entry(id: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry { chunk: chunk(id), vector }
    }

    #[test]
    fn vectors_are_normalized_on_build() {
        let idx = VectorIndex::build("t", vec![entry("a", vec![3.0, 4.0])]).expect("build");
        let v = idx.vector(0).expect("row");
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
        assert!(idx.vector(1).is_none());
    }

    #[test]
    fn build_rejects_bad_entries() {
        let dup = VectorIndex::build("t", vec![entry("a", vec![1.0]), entry("a", vec![1.0])]);
        assert!(matches!(dup, Err(IndexBuildError::DuplicateChunkId(id)) if id == "a"));

        let dims = VectorIndex::build("t", vec![entry("a", vec![1.0, 0.0]), entry("b", vec![1.0])]);
        assert!(matches!(dims, Err(IndexBuildError::DimensionMismatch { expected: 2, found: 1, .. })));

        let zero = VectorIndex::build("t", vec![entry("a", vec![0.0, 0.0])]);
        assert!(matches!(zero, Err(IndexBuildError::InvalidVector { .. })));

        let nan = VectorIndex::build("t", vec![entry("a", vec![f32::NAN, 1.0])]);
        assert!(matches!(nan, Err(IndexBuildError::InvalidVector { .. })));
    }

    #[test]
    fn ties_keep_insertion_order() {
        let idx = VectorIndex::build(
            "t",
            vec![entry("first", vec![1.0, 0.0]), entry("other", vec![0.0, 1.0]), entry("second", vec![2.0, 0.0])],
        )
        .expect("build");
        let hits = idx.search(&[1.0, 0.0], 3, &|_: &Chunk| true).expect("search");
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "other"]);
    }

    #[test]
    fn empty_index_is_not_ready() {
        let idx = VectorIndex::build("t", Vec::new()).expect("build");
        let err = idx.search(&[1.0], 3, &|_: &Chunk| true).unwrap_err();
        assert!(matches!(err, Error::IndexNotReady(_)));
    }

    #[test]
    fn query_dimension_must_match() {
        let idx = VectorIndex::build("t", vec![entry("a", vec![1.0, 0.0])]).expect("build");
        let err = idx.search(&[1.0, 0.0, 0.0], 1, &|_: &Chunk| true).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, found: 3 }));
        assert!(idx.search(&[1.0, 0.0], 0, &|_: &Chunk| true).expect("k=0").is_empty());
    }
}
