//! One-shot batch build: embed chunks, build the index, persist it, publish it.
//!
//! Every step runs to completion before the next starts. A failure at any
//! point returns before the artifact is replaced or the handle is touched, so
//! the previously published index keeps serving.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};

use zonerag_core::types::Chunk;
use zonerag_embed::{EmbedTask, EmbeddingAdapter};

use crate::artifact;
use crate::error::{ArtifactError, IndexBuildError};
use crate::handle::IndexHandle;
use crate::index::{IndexEntry, VectorIndex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub chunks: usize,
    pub dim: usize,
    pub embedder_id: String,
    pub artifact_path: PathBuf,
}

pub async fn build_index(
    chunks: Vec<Chunk>,
    adapter: &EmbeddingAdapter,
    artifact_path: &Path,
    handle: &IndexHandle,
) -> Result<BuildReport, IndexBuildError> {
    if chunks.is_empty() {
        return Err(IndexBuildError::Empty);
    }
    check_unique_ids(&chunks)?;

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let pb = ProgressBar::new(texts.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{spinner} embedding [{bar:40}] {pos}/{len} ({eta})") {
        pb.set_style(style.progress_chars("=> "));
    }
    let mut vectors = Vec::with_capacity(texts.len());
    let embedded = adapter
        .embed_into_with_progress(&texts, EmbedTask::Document, &mut vectors, |done| pb.set_position(done as u64))
        .await;
    match embedded {
        Ok(()) => pb.finish_and_clear(),
        Err(e) => {
            pb.abandon();
            tracing::error!(
                target: "vector",
                "index build aborted: {e}; {} of {} chunks embedded, artifact left unchanged",
                vectors.len(),
                texts.len()
            );
            return Err(e.into());
        }
    }

    let entries: Vec<IndexEntry> =
        chunks.into_iter().zip(vectors).map(|(chunk, vector)| IndexEntry { chunk, vector }).collect();
    let index = VectorIndex::build(adapter.embedder_id(), entries)?;
    artifact::save(&index, artifact_path)?;

    let report = BuildReport {
        chunks: index.len(),
        dim: index.dim(),
        embedder_id: index.embedder_id().to_string(),
        artifact_path: artifact_path.to_path_buf(),
    };
    handle.publish(index);
    Ok(report)
}

/// Load a persisted artifact and publish it. Used at startup.
pub fn open_index(artifact_path: &Path, handle: &IndexHandle) -> Result<(), ArtifactError> {
    let index = artifact::load(artifact_path)?;
    handle.publish(index);
    Ok(())
}

fn check_unique_ids(chunks: &[Chunk]) -> Result<(), IndexBuildError> {
    let mut seen = HashSet::with_capacity(chunks.len());
    for c in chunks {
        if !seen.insert(c.id.as_str()) {
            return Err(IndexBuildError::DuplicateChunkId(c.id.clone()));
        }
    }
    Ok(())
}
