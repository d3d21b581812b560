//! zonerag-vector
//!
//! Exact nearest-neighbour search over chunk embeddings with metadata
//! filters, a persisted single-file artifact, and an atomically swappable
//! handle for serving.

pub mod artifact;
pub mod build;
pub mod error;
pub mod filter;
pub mod handle;
pub mod index;

pub use build::{build_index, open_index, BuildReport};
pub use error::{ArtifactError, IndexBuildError};
pub use filter::{ChunkFilter, MetadataFilter};
pub use handle::IndexHandle;
pub use index::{IndexEntry, IndexHeader, VectorIndex};
