use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use serde::Serialize;

use zonerag_core::config::RetrievalConfig;
use zonerag_core::error::{EmbeddingServiceError, Error, MalformedInputError, ServiceErrorKind};
use zonerag_core::types::{PropertyContext, ScoredChunk};
use zonerag_embed::EmbeddingAdapter;
use zonerag_rules::RuleTable;
use zonerag_vector::{IndexHandle, MetadataFilter};

use crate::citations::CitationTable;

pub const CITATION_EXCERPT_CHARS: usize = 500;

/// Ranked hits for one query. `underfilled` means the scoped search matched
/// fewer than `k` chunks; the scope is never widened to make up the difference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Retrieval {
    pub hits: Vec<ScoredChunk>,
    pub k: usize,
    pub underfilled: bool,
}

pub struct Retriever {
    adapter: EmbeddingAdapter,
    index: Arc<IndexHandle>,
    query_timeout: Duration,
    include_unzoned: bool,
}

impl Retriever {
    pub fn new(adapter: EmbeddingAdapter, index: Arc<IndexHandle>, config: &RetrievalConfig) -> Self {
        Self { adapter, index, query_timeout: config.query_timeout(), include_unzoned: config.include_unzoned }
    }

    pub fn filter_for(&self, city: &str, zoning: Option<&str>) -> MetadataFilter {
        let filter = MetadataFilter::for_city(city).include_unzoned(self.include_unzoned);
        match zoning.map(str::trim).filter(|z| !z.is_empty()) {
            Some(z) => filter.with_zoning(z),
            None => filter,
        }
    }

    /// Top-`k` chunks for `query` within `city` (and `zoning`, when given).
    ///
    /// Runs under the configured query timeout; on expiry nothing is returned
    /// but an `EmbeddingServiceError` of kind `Timeout`.
    pub async fn retrieve(&self, query: &str, city: &str, zoning: Option<&str>, k: usize) -> Result<Retrieval, Error> {
        if query.trim().is_empty() {
            return Err(MalformedInputError::new("query", "query text is empty").into());
        }
        if city.trim().is_empty() {
            return Err(MalformedInputError::new("query", "property city is required").into());
        }
        let filter = self.filter_for(city, zoning);

        let hits = match tokio::time::timeout(self.query_timeout, self.search(query, &filter, k)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(target: "retrieve", "query timed out after {:?}", self.query_timeout);
                return Err(EmbeddingServiceError {
                    kind: ServiceErrorKind::Timeout,
                    batch_index: 0,
                    input_range: 0..1,
                    attempts: 0,
                    message: format!("query did not complete within {:?}", self.query_timeout),
                }
                .into());
            }
        };

        let underfilled = hits.len() < k;
        if underfilled {
            tracing::info!(
                target: "retrieve",
                "only {} of {k} hits for city={city} zoning={}",
                hits.len(),
                zoning.unwrap_or("-")
            );
        }
        Ok(Retrieval { hits, k, underfilled })
    }

    async fn search(&self, query: &str, filter: &MetadataFilter, k: usize) -> Result<Vec<ScoredChunk>, Error> {
        let vector = self.adapter.embed_query(query).await?;
        self.index.search(&vector, k, filter)
    }

    /// One scoped query per distinct citation topic in `rules`.
    ///
    /// Without a city the property cannot be scoped, so no query is issued and
    /// the table is empty.
    pub async fn collect_citations(&self, ctx: &PropertyContext, rules: &RuleTable, k: usize) -> Result<CitationTable, Error> {
        let mut table = CitationTable::new();
        let Some(city) = ctx.city() else {
            tracing::debug!(target: "retrieve", "no city for {}; skipping citation lookup", ctx.address);
            return Ok(table);
        };
        let topics = rules.citation_topics();
        let zoning = ctx.zoning_label();
        let results = try_join_all(topics.iter().map(|topic| self.retrieve(topic, city, zoning, k))).await?;
        for (topic, retrieval) in topics.into_iter().zip(results) {
            let citations = retrieval.hits.iter().map(|h| h.chunk.citation(h.score, CITATION_EXCERPT_CHARS)).collect();
            table.insert(topic, citations);
        }
        Ok(table)
    }
}
