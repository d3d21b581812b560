//! Batching, retry and validation around an [`EmbeddingService`].

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use zonerag_core::config::{EmbeddingConfig, RetryConfig};
use zonerag_core::error::{EmbeddingServiceError, ServiceErrorKind};

use crate::service::{EmbedTask, EmbeddingService, ServiceFailure};

/// Exponential backoff: attempt `n` waits `min(base * 2^(n-1), max)`, scaled
/// by a random factor in `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, base_delay: Duration::ZERO, max_delay: Duration::ZERO, jitter: 0.0 }
    }

    /// Delay before retrying after failed attempt `attempt` (1-based), before jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(30);
        self.base_delay.saturating_mul(1u32 << exp).min(self.max_delay)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for(attempt);
        let jitter = self.jitter.clamp(0.0, 0.99);
        if jitter == 0.0 || delay.is_zero() {
            return delay;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
        delay.mul_f64(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(c: &RetryConfig) -> Self {
        Self {
            max_attempts: c.max_attempts.max(1),
            base_delay: Duration::from_millis(c.base_delay_ms),
            max_delay: Duration::from_millis(c.max_delay_ms),
            jitter: c.jitter,
        }
    }
}

/// Order-preserving, 1:1 embedding of arbitrarily long inputs.
#[derive(Clone)]
pub struct EmbeddingAdapter {
    service: Arc<dyn EmbeddingService>,
    batch_size: usize,
    request_timeout: Duration,
    retry: RetryPolicy,
}

impl EmbeddingAdapter {
    pub fn new(service: Arc<dyn EmbeddingService>, batch_size: usize, request_timeout: Duration, retry: RetryPolicy) -> Self {
        Self { service, batch_size: batch_size.max(1), request_timeout, retry }
    }

    pub fn from_config(service: Arc<dyn EmbeddingService>, config: &EmbeddingConfig) -> Self {
        Self::new(service, config.batch_size, config.request_timeout(), RetryPolicy::from(&config.retry))
    }

    pub fn embedder_id(&self) -> &str {
        self.service.embedder_id()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn embed(&self, texts: &[String], task: EmbedTask) -> Result<Vec<Vec<f32>>, EmbeddingServiceError> {
        let mut out = Vec::with_capacity(texts.len());
        self.embed_into(texts, task, &mut out).await?;
        Ok(out)
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingServiceError> {
        let mut out = self.embed(&[text.to_string()], EmbedTask::Query).await?;
        out.pop().ok_or_else(|| error(ServiceErrorKind::Permanent, 0, 0..1, 1, "service returned no vector"))
    }

    /// Embed `texts[out.len()..]`, appending to `out`.
    ///
    /// On failure `out` holds every vector embedded so far and the error's
    /// `input_range.start == out.len()`, so calling again with the same `out`
    /// resumes where it stopped.
    pub async fn embed_into(
        &self,
        texts: &[String],
        task: EmbedTask,
        out: &mut Vec<Vec<f32>>,
    ) -> Result<(), EmbeddingServiceError> {
        self.embed_into_with_progress(texts, task, out, |_| {}).await
    }

    /// Like [`embed_into`](Self::embed_into), calling `progress` with the
    /// number of inputs finished after each batch.
    pub async fn embed_into_with_progress<F>(
        &self,
        texts: &[String],
        task: EmbedTask,
        out: &mut Vec<Vec<f32>>,
        mut progress: F,
    ) -> Result<(), EmbeddingServiceError>
    where
        F: FnMut(usize) + Send,
    {
        if out.len() > texts.len() {
            return Err(error(
                ServiceErrorKind::Permanent,
                0,
                texts.len()..out.len(),
                0,
                format!("resume offset {} is past the end of {} inputs", out.len(), texts.len()),
            ));
        }
        while out.len() < texts.len() {
            let start = out.len();
            let end = (start + self.batch_size).min(texts.len());
            let batch_index = start / self.batch_size;
            let expected_dim = out.first().map(Vec::len);
            let vectors = self.embed_batch_with_retry(&texts[start..end], task, batch_index, start..end, expected_dim).await?;
            out.extend(vectors);
            progress(out.len());
        }
        Ok(())
    }

    async fn embed_batch_with_retry(
        &self,
        batch: &[String],
        task: EmbedTask,
        batch_index: usize,
        range: Range<usize>,
        expected_dim: Option<usize>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingServiceError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let failure = match tokio::time::timeout(self.request_timeout, self.service.embed_batch(batch, task)).await {
                Ok(Ok(vectors)) => match validate(&vectors, batch.len(), expected_dim) {
                    Ok(()) => return Ok(vectors),
                    Err(reason) => ServiceFailure::permanent(format!("malformed response: {reason}")),
                },
                Ok(Err(failure)) => failure,
                Err(_) => ServiceFailure::timeout(format!("no response within {:?}", self.request_timeout)),
            };

            if !failure.is_retryable() || attempt >= self.retry.max_attempts {
                tracing::error!(
                    target: "embed",
                    "batch {batch_index} (inputs {}..{}) failed after {attempt} attempt(s): {failure}",
                    range.start,
                    range.end
                );
                return Err(error(failure.kind, batch_index, range, attempt, failure.message));
            }
            let delay = self.retry.delay_for(attempt);
            tracing::warn!(
                target: "embed",
                "batch {batch_index} attempt {attempt}/{} failed ({failure}); retrying in {delay:?}",
                self.retry.max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn validate(vectors: &[Vec<f32>], expected_len: usize, expected_dim: Option<usize>) -> Result<(), String> {
    if vectors.len() != expected_len {
        return Err(format!("{} vectors for {} inputs", vectors.len(), expected_len));
    }
    let dim = match expected_dim.or_else(|| vectors.first().map(Vec::len)) {
        Some(0) => return Err("zero-dimensional vector".to_string()),
        Some(d) => d,
        None => return Ok(()),
    };
    for (i, v) in vectors.iter().enumerate() {
        if v.len() != dim {
            return Err(format!("vector {i} has dimension {}, expected {dim}", v.len()));
        }
        if v.iter().any(|x| !x.is_finite()) {
            return Err(format!("vector {i} has non-finite components"));
        }
    }
    Ok(())
}

fn error(
    kind: ServiceErrorKind,
    batch_index: usize,
    input_range: Range<usize>,
    attempts: u32,
    message: impl Into<String>,
) -> EmbeddingServiceError {
    EmbeddingServiceError { kind, batch_index, input_range, attempts, message: message.into() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let p = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            jitter: 0.0,
        };
        let delays: Vec<u64> = (1..=5).map(|n| p.delay_for(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn jitter_stays_within_band() {
        let p = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            jitter: 0.2,
        };
        for _ in 0..50 {
            let d = p.delay_for(1).as_millis();
            assert!((799..=1201).contains(&d), "delay {d}ms outside jitter band");
        }
    }

    #[test]
    fn validation_rejects_bad_shapes() {
        assert!(validate(&[vec![1.0, 0.0]], 2, None).is_err());
        assert!(validate(&[vec![1.0, 0.0], vec![1.0]], 2, None).is_err());
        assert!(validate(&[vec![f32::NAN, 0.0]], 1, None).is_err());
        assert!(validate(&[vec![]], 1, None).is_err());
        assert!(validate(&[vec![1.0, 0.0]], 1, Some(3)).is_err());
        assert!(validate(&[vec![1.0, 0.0]], 1, Some(2)).is_ok());
    }
}
