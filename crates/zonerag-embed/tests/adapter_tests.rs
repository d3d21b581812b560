use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use zonerag_core::error::ServiceErrorKind;
use zonerag_embed::{EmbedTask, EmbeddingAdapter, EmbeddingService, FakeEmbedder, RetryPolicy, ServiceFailure};

/// Replays a scripted sequence of outcomes, one per call; embeds with the fake
/// embedder once the script runs out.
struct ScriptedService {
    script: Mutex<VecDeque<Option<ServiceFailure>>>,
    calls: Mutex<Vec<(usize, EmbedTask)>>,
    delay: Duration,
    inner: FakeEmbedder,
}

impl ScriptedService {
    fn new(script: Vec<Option<ServiceFailure>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            inner: FakeEmbedder::new(16),
        }
    }

    fn slow(delay: Duration) -> Self {
        Self { delay, ..Self::new(Vec::new()) }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl EmbeddingService for ScriptedService {
    fn embedder_id(&self) -> &str {
        "scripted"
    }

    async fn embed_batch(&self, texts: &[String], task: EmbedTask) -> Result<Vec<Vec<f32>>, ServiceFailure> {
        self.calls.lock().push((texts.len(), task));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().pop_front().flatten();
        match next {
            Some(failure) => Err(failure),
            None => self.inner.embed_batch(texts, task).await,
        }
    }
}

struct WrongCount;

#[async_trait]
impl EmbeddingService for WrongCount {
    fn embedder_id(&self) -> &str {
        "wrong-count"
    }

    async fn embed_batch(&self, _texts: &[String], _task: EmbedTask) -> Result<Vec<Vec<f32>>, ServiceFailure> {
        Ok(vec![vec![1.0, 0.0]])
    }
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        jitter: 0.0,
    }
}

fn texts(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("section {i} setback requirements")).collect()
}

#[tokio::test]
async fn batches_preserve_order_and_count() {
    let service = Arc::new(ScriptedService::new(Vec::new()));
    let adapter = EmbeddingAdapter::new(service.clone(), 3, Duration::from_secs(5), fast_retry(3));
    let inputs = texts(7);
    let out = adapter.embed(&inputs, EmbedTask::Document).await.expect("embed");

    assert_eq!(out.len(), 7);
    let reference = FakeEmbedder::new(16);
    for (text, v) in inputs.iter().zip(&out) {
        assert_eq!(v, &reference.embed_text(text));
    }
    let sizes: Vec<usize> = service.calls.lock().iter().map(|(n, _)| *n).collect();
    assert_eq!(sizes, vec![3, 3, 1]);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let service = Arc::new(ScriptedService::new(vec![
        Some(ServiceFailure::transient("429 rate limited")),
        Some(ServiceFailure::transient("503 unavailable")),
    ]));
    let adapter = EmbeddingAdapter::new(service.clone(), 8, Duration::from_secs(5), fast_retry(3));
    let out = adapter.embed(&texts(2), EmbedTask::Document).await.expect("third attempt succeeds");
    assert_eq!(out.len(), 2);
    assert_eq!(service.call_count(), 3);
}

#[tokio::test]
async fn retries_are_bounded() {
    let script = (0..10).map(|_| Some(ServiceFailure::transient("503"))).collect();
    let service = Arc::new(ScriptedService::new(script));
    let adapter = EmbeddingAdapter::new(service.clone(), 8, Duration::from_secs(5), fast_retry(4));
    let err = adapter.embed(&texts(2), EmbedTask::Document).await.unwrap_err();
    assert_eq!(err.kind, ServiceErrorKind::Transient);
    assert_eq!(err.attempts, 4);
    assert_eq!(service.call_count(), 4);
}

#[tokio::test]
async fn permanent_failure_is_not_retried_and_reports_resume_offset() {
    // Batches of 2: the first two succeed, the third hits an auth error.
    let service = Arc::new(ScriptedService::new(vec![
        None,
        None,
        Some(ServiceFailure::permanent("401 invalid API key")),
    ]));
    let adapter = EmbeddingAdapter::new(service.clone(), 2, Duration::from_secs(5), fast_retry(5));
    let inputs = texts(7);
    let mut out = Vec::new();
    let err = adapter.embed_into(&inputs, EmbedTask::Document, &mut out).await.unwrap_err();

    assert!(err.is_permanent());
    assert_eq!(err.batch_index, 2);
    assert_eq!(err.input_range, 4..6);
    assert_eq!(err.resume_offset(), 4);
    assert_eq!(out.len(), 4);
    assert_eq!(service.call_count(), 3);

    adapter.embed_into(&inputs, EmbedTask::Document, &mut out).await.expect("resume");
    assert_eq!(out.len(), 7);
    // Only the remaining inputs were sent again.
    let sizes: Vec<usize> = service.calls.lock().iter().map(|(n, _)| *n).collect();
    assert_eq!(sizes, vec![2, 2, 2, 2, 1]);
}

#[tokio::test]
async fn slow_service_times_out() {
    let service = Arc::new(ScriptedService::slow(Duration::from_millis(500)));
    let adapter = EmbeddingAdapter::new(service.clone(), 8, Duration::from_millis(20), fast_retry(2));
    let err = adapter.embed(&texts(1), EmbedTask::Document).await.unwrap_err();
    assert_eq!(err.kind, ServiceErrorKind::Timeout);
    assert_eq!(service.call_count(), 2);
}

#[tokio::test]
async fn malformed_response_is_permanent() {
    let adapter = EmbeddingAdapter::new(Arc::new(WrongCount), 8, Duration::from_secs(5), fast_retry(5));
    let err = adapter.embed(&texts(3), EmbedTask::Document).await.unwrap_err();
    assert_eq!(err.kind, ServiceErrorKind::Permanent);
    assert_eq!(err.attempts, 1);
    assert!(err.message.contains("1 vectors for 3 inputs"));
}

#[tokio::test]
async fn query_embedding_uses_query_task() {
    let service = Arc::new(ScriptedService::new(Vec::new()));
    let adapter = EmbeddingAdapter::new(service.clone(), 8, Duration::from_secs(5), RetryPolicy::no_retry());
    let v = adapter.embed_query("minimum lot size RH-2").await.expect("query");
    assert_eq!(v.len(), 16);
    assert_eq!(service.calls.lock()[0], (1, EmbedTask::Query));
}
