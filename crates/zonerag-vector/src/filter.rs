//! Metadata predicates applied before the top-k cut.

use zonerag_core::types::{normalize_city, Chunk};

pub trait ChunkFilter {
    fn matches(&self, chunk: &Chunk) -> bool;
}

impl<F> ChunkFilter for F
where
    F: Fn(&Chunk) -> bool,
{
    fn matches(&self, chunk: &Chunk) -> bool {
        self(chunk)
    }
}

/// Conjunction of equality clauses over chunk metadata. Unset fields match
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    /// Stored normalized (see [`normalize_city`]).
    city: Option<String>,
    zoning_label: Option<String>,
    /// Chunks with no zoning label satisfy the zoning clause.
    include_unzoned: bool,
}

impl MetadataFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn for_city(city: &str) -> Self {
        Self { city: Some(normalize_city(city)), ..Self::default() }
    }

    pub fn with_zoning(mut self, zoning_label: &str) -> Self {
        self.zoning_label = Some(zoning_label.trim().to_string());
        self
    }

    pub fn include_unzoned(mut self, include: bool) -> Self {
        self.include_unzoned = include;
        self
    }

    pub fn city(&self) -> Option<&str> {
        self.city.as_deref()
    }

    pub fn zoning_label(&self) -> Option<&str> {
        self.zoning_label.as_deref()
    }
}

impl ChunkFilter for MetadataFilter {
    fn matches(&self, chunk: &Chunk) -> bool {
        if let Some(city) = &self.city {
            if normalize_city(&chunk.city) != *city {
                return false;
            }
        }
        if let Some(zoning) = &self.zoning_label {
            match chunk.zoning_label.as_deref().map(str::trim) {
                Some(z) if !z.is_empty() => {
                    if z != zoning {
                        return false;
                    }
                }
                _ => {
                    if !self.include_unzoned {
                        return false;
                    }
                }
            }
        }
        true
    }
}
