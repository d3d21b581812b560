use std::collections::HashMap;

use zonerag_core::traits::CitationSource;
use zonerag_core::types::Citation;

/// Citations pre-fetched per topic for one property.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CitationTable {
    by_topic: HashMap<String, Vec<Citation>>,
}

impl CitationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, topic: impl Into<String>, citations: Vec<Citation>) {
        self.by_topic.insert(topic.into(), citations);
    }

    pub fn len(&self) -> usize {
        self.by_topic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_topic.is_empty()
    }
}

impl CitationSource for CitationTable {
    fn citations_for(&self, topic: &str) -> &[Citation] {
        self.by_topic.get(topic).map(Vec::as_slice).unwrap_or(&[])
    }
}
