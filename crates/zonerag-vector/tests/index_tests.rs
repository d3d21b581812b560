use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use zonerag_core::error::Error;
use zonerag_core::types::{Chunk, LineRange};
use zonerag_embed::{EmbedTask, EmbeddingAdapter, EmbeddingService, FakeEmbedder, RetryPolicy, ServiceFailure};
use zonerag_vector::{
    artifact, build_index, open_index, ChunkFilter, IndexBuildError, IndexEntry, IndexHandle, MetadataFilter,
    VectorIndex,
};

fn chunk(id: &str, city: &str, zoning: Option<&str>, text: &str) -> Chunk {
    Chunk {
        id: id.into(),
        text: text.into(),
        token_count: text.split_whitespace().count(),
        city: city.into(),
        zoning_label: zoning.map(str::to_string),
        source_document_id: format!("{}_code", city.to_lowercase().replace(' ', "_")),
        page_number: 1,
        line_range: LineRange { start: 1, end: 3 },
        byte_range: (0, text.len()),
        chunk_index: 0,
    }
}

fn corpus() -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = (0..3)
        .map(|i| chunk(&format!("oak{i}"), "Oakland", None, &format!("Oakland accessory dwelling unit rule {i}")))
        .collect();
    chunks.extend((0..10).map(|i| {
        let zoning = if i % 2 == 0 { "RH-1" } else { "RH-2" };
        chunk(&format!("sf{i}"), "San Francisco", Some(zoning), &format!("San Francisco lot split rule {i}"))
    }));
    chunks
}

fn fake_adapter() -> EmbeddingAdapter {
    EmbeddingAdapter::new(Arc::new(FakeEmbedder::new(64)), 4, Duration::from_secs(5), RetryPolicy::no_retry())
}

/// Fails permanently (as an auth error would) from call `fail_from` onward.
struct AuthFailsMidBuild {
    inner: FakeEmbedder,
    calls: AtomicUsize,
    fail_from: usize,
}

#[async_trait]
impl EmbeddingService for AuthFailsMidBuild {
    fn embedder_id(&self) -> &str {
        "auth-fails"
    }

    async fn embed_batch(&self, texts: &[String], task: EmbedTask) -> Result<Vec<Vec<f32>>, ServiceFailure> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.fail_from {
            return Err(ServiceFailure::permanent("401 API key not valid"));
        }
        self.inner.embed_batch(texts, task).await
    }
}

#[tokio::test]
async fn city_scoped_search_returns_only_that_city() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let handle = IndexHandle::new();
    let report = build_index(corpus(), &fake_adapter(), &tmp.path().join("idx.zrix"), &handle).await?;
    assert_eq!(report.chunks, 13);
    assert_eq!(report.dim, 64);

    let q = FakeEmbedder::new(64).embed_text("accessory dwelling unit");
    let hits = handle.search(&q, 8, &MetadataFilter::for_city("Oakland"))?;
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|h| h.chunk.city == "Oakland"));
    Ok(())
}

#[tokio::test]
async fn scores_are_non_increasing_and_hits_satisfy_filter() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let handle = IndexHandle::new();
    build_index(corpus(), &fake_adapter(), &tmp.path().join("idx.zrix"), &handle).await?;

    let q = FakeEmbedder::new(64).embed_text("lot split rule 3");
    let filter = MetadataFilter::for_city("san francisco").with_zoning("RH-2");
    let hits = handle.search(&q, 10, &filter)?;
    assert_eq!(hits.len(), 5);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(hits.iter().all(|h| filter.matches(&h.chunk)));
    Ok(())
}

#[tokio::test]
async fn rebuild_on_identical_input_ranks_identically() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (a, b) = (IndexHandle::new(), IndexHandle::new());
    build_index(corpus(), &fake_adapter(), &tmp.path().join("a.zrix"), &a).await?;
    build_index(corpus(), &fake_adapter(), &tmp.path().join("b.zrix"), &b).await?;

    let q = FakeEmbedder::new(64).embed_text("rule 2 dwelling");
    let ids = |h: &IndexHandle| -> anyhow::Result<Vec<String>> {
        Ok(h.search(&q, 13, &MetadataFilter::any())?.into_iter().map(|s| s.chunk.id).collect())
    };
    assert_eq!(ids(&a)?, ids(&b)?);
    Ok(())
}

#[tokio::test]
async fn permanent_failure_mid_build_leaves_artifact_and_handle_alone() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("regulations.zrix");
    let handle = IndexHandle::new();
    build_index(corpus(), &fake_adapter(), &path, &handle).await?;
    let before = std::fs::read(&path)?;
    let served = handle.snapshot()?;

    let failing = Arc::new(AuthFailsMidBuild { inner: FakeEmbedder::new(64), calls: AtomicUsize::new(0), fail_from: 2 });
    let adapter = EmbeddingAdapter::new(failing, 4, Duration::from_secs(5), RetryPolicy::no_retry());
    let mut rebuilt = corpus();
    rebuilt.push(chunk("oak9", "Oakland", None, "new Oakland rule"));
    let err = build_index(rebuilt, &adapter, &path, &handle).await.unwrap_err();

    match err {
        IndexBuildError::Embedding(e) => {
            assert!(e.is_permanent());
            assert_eq!(e.resume_offset(), 8);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(std::fs::read(&path)?, before);
    assert!(Arc::ptr_eq(&served, &handle.snapshot()?));

    let q = FakeEmbedder::new(64).embed_text("Oakland");
    assert_eq!(handle.search(&q, 8, &MetadataFilter::for_city("Oakland"))?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn artifact_reopens_into_a_servable_index() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("nested/dir/regulations.zrix");
    let built = IndexHandle::new();
    build_index(corpus(), &fake_adapter(), &path, &built).await?;

    let reopened = IndexHandle::new();
    open_index(&path, &reopened)?;
    let (a, b) = (built.snapshot()?, reopened.snapshot()?);
    assert_eq!(a.header(), b.header());
    assert_eq!(a.chunks(), b.chunks());

    let q = FakeEmbedder::new(64).embed_text("lot split");
    let filter = MetadataFilter::for_city("San Francisco");
    assert_eq!(built.search(&q, 5, &filter)?, reopened.search(&q, 5, &filter)?);

    // Only the final artifact remains; the temp file was renamed into place.
    let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())?.collect::<Result<_, _>>()?;
    assert_eq!(names.len(), 1);
    Ok(())
}

#[test]
fn unpublished_handle_is_not_ready() {
    let handle = IndexHandle::new();
    assert!(!handle.is_ready());
    let err = handle.search(&[1.0, 0.0], 3, &MetadataFilter::any()).unwrap_err();
    assert!(matches!(err, Error::IndexNotReady(_)));
}

#[tokio::test]
async fn duplicate_ids_abort_before_embedding() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("idx.zrix");
    let mut chunks = corpus();
    chunks.push(chunks[0].clone());
    let err = build_index(chunks, &fake_adapter(), &path, &IndexHandle::new()).await.unwrap_err();
    assert!(matches!(err, IndexBuildError::DuplicateChunkId(id) if id == "oak0"));
    assert!(!path.exists());
    assert!(matches!(artifact::load(&path), Err(zonerag_vector::ArtifactError::Io { .. })));
}

#[test]
fn snapshot_outlives_publish() -> anyhow::Result<()> {
    let entries = |ids: &[&str], v: [f32; 2]| -> Vec<IndexEntry> {
        ids.iter()
            .map(|id| IndexEntry { chunk: chunk(id, "Oakland", None, "accessory dwelling unit"), vector: v.to_vec() })
            .collect()
    };
    let handle = IndexHandle::new();
    assert!(handle.publish(VectorIndex::build("first", entries(&["a1", "a2"], [1.0, 0.0]))?).is_none());
    let held = handle.snapshot()?;

    let previous = handle.publish(VectorIndex::build("second", entries(&["b1"], [0.0, 1.0]))?);
    assert_eq!(previous.map(|p| p.embedder_id().to_string()).as_deref(), Some("first"));

    let ids = |hits: Vec<zonerag_core::types::ScoredChunk>| hits.into_iter().map(|h| h.chunk.id).collect::<Vec<_>>();
    assert_eq!(held.embedder_id(), "first");
    assert_eq!(ids(held.search(&[1.0, 0.0], 5, &MetadataFilter::any())?), vec!["a1", "a2"]);
    assert_eq!(handle.snapshot()?.embedder_id(), "second");
    assert_eq!(ids(handle.search(&[1.0, 0.0], 5, &MetadataFilter::any())?), vec!["b1"]);
    Ok(())
}
