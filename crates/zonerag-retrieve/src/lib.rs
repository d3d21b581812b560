//! zonerag-retrieve
//!
//! Query-time orchestration: embed the question, scope the search to the
//! property's city and zoning, and return ranked chunks. Also pre-fetches the
//! per-topic citations consumed by rule evaluation.

pub mod citations;
pub mod retriever;

pub use citations::CitationTable;
pub use retriever::{Retrieval, Retriever, CITATION_EXCERPT_CHARS};
