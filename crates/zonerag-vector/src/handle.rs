use std::sync::Arc;

use parking_lot::RwLock;

use zonerag_core::error::{Error, IndexNotReadyError};
use zonerag_core::types::ScoredChunk;

use crate::filter::ChunkFilter;
use crate::index::VectorIndex;

/// Shared pointer to the currently served index.
///
/// Readers take a snapshot `Arc` and search it without holding the lock; a
/// rebuild publishes a complete new index in one swap. Searches already in
/// flight finish against the snapshot they started with.
#[derive(Default)]
pub struct IndexHandle {
    current: RwLock<Option<Arc<VectorIndex>>>,
}

impl IndexHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(index: VectorIndex) -> Self {
        Self { current: RwLock::new(Some(Arc::new(index))) }
    }

    /// Swap in `index`, returning the one it replaces.
    pub fn publish(&self, index: VectorIndex) -> Option<Arc<VectorIndex>> {
        let next = Arc::new(index);
        tracing::info!(target: "vector", "publishing index: {} entries, d={}, embedder {}", next.len(), next.dim(), next.embedder_id());
        self.current.write().replace(next)
    }

    pub fn snapshot(&self) -> Result<Arc<VectorIndex>, IndexNotReadyError> {
        self.current.read().clone().ok_or_else(|| IndexNotReadyError::new("no index has been published"))
    }

    pub fn is_ready(&self) -> bool {
        self.current.read().as_ref().is_some_and(|idx| !idx.is_empty())
    }

    pub fn search<F>(&self, query: &[f32], k: usize, filter: &F) -> Result<Vec<ScoredChunk>, Error>
    where
        F: ChunkFilter + ?Sized,
    {
        self.snapshot()?.search(query, k, filter)
    }
}
