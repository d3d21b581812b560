use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use twox_hash::XxHash64;

use crate::service::{EmbedTask, EmbeddingService, ServiceFailure};

/// Deterministic hashed bag-of-words embedder for tests and offline runs.
///
/// Texts sharing words land near each other, which is enough for filter and
/// ranking tests without a network.
#[derive(Debug, Clone)]
pub struct FakeEmbedder {
    dim: usize,
    id: String,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, id: format!("fake:xxhash64:d{dim}") }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if token.is_empty() {
                continue;
            }
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            v[idx] += 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
        }
        // Keep empty or all-punctuation text a valid, non-zero vector.
        if v.iter().all(|x| *x == 0.0) {
            v[0] = 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Default for FakeEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingService for FakeEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    async fn embed_batch(&self, texts: &[String], _task: EmbedTask) -> Result<Vec<Vec<f32>>, ServiceFailure> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
