//! Integration tests for the long-term store
//!
//! Exercises the Librarian front over the durable Lance backend and
//! checks ranking equivalence against the in-process fallback.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use memoria::librarian::{
    LanceArchive, Librarian, LongTermBackend, MemoryArchive, RecordFilter, StoreOutcome,
};
use memoria::memory::types::MemoryRecord;
use tempfile::tempdir;

const DIM: usize = 8;

async fn lance_librarian(dir: &Path) -> Librarian {
    let backend = LanceArchive::connect(dir, DIM, 4)
        .await
        .expect("lance archive connects");
    Librarian::with_backend(Arc::new(backend), false, DIM)
}

fn axis_embedding(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis] = 1.0;
    v
}

/// Unit vector in the first-quadrant plane of axes 0 and 1, `theta`
/// of the way from axis 0 towards axis 1.
fn angled_embedding(theta: f32) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[0] = theta.cos();
    v[1] = theta.sin();
    v
}

#[tokio::test]
async fn test_store_and_get_roundtrip() {
    let dir = tempdir().unwrap();
    let librarian = lance_librarian(dir.path()).await;

    let metadata = HashMap::from([("origin".to_string(), "manual".to_string())]);
    let outcome = librarian
        .store("t1", "The sky is blue", "h1", axis_embedding(0), metadata.clone(), false)
        .await
        .unwrap();
    let StoreOutcome::Inserted(id) = outcome else {
        panic!("first store should insert");
    };

    let record = librarian.get("t1", id).await.unwrap().expect("record exists");
    assert_eq!(record.content, "The sky is blue");
    assert_eq!(record.content_hash, "h1");
    assert_eq!(record.metadata, metadata);
    assert_eq!(record.embedding.len(), DIM);
    assert!(!record.retained);
}

#[tokio::test]
async fn test_duplicate_hash_is_skipped() {
    let dir = tempdir().unwrap();
    let librarian = lance_librarian(dir.path()).await;

    let first = librarian
        .store("t1", "The sky is blue", "h1", axis_embedding(0), HashMap::new(), false)
        .await
        .unwrap();

    let second = librarian
        .store("t1", "The sky is blue", "h1", axis_embedding(0), HashMap::new(), false)
        .await
        .unwrap();

    assert!(second.is_duplicate());
    assert_eq!(second.memory_id(), first.memory_id());
    assert_eq!(librarian.usage("t1").await.unwrap().records, 1);
}

#[tokio::test]
async fn test_same_hash_across_tenants_is_not_a_duplicate() {
    let dir = tempdir().unwrap();
    let librarian = lance_librarian(dir.path()).await;

    let a = librarian
        .store("t1", "shared", "h1", axis_embedding(0), HashMap::new(), false)
        .await
        .unwrap();
    let b = librarian
        .store("t2", "shared", "h1", axis_embedding(0), HashMap::new(), false)
        .await
        .unwrap();

    assert!(!a.is_duplicate());
    assert!(!b.is_duplicate());
}

#[tokio::test]
async fn test_search_returns_qualifying_results_most_similar_first() {
    let dir = tempdir().unwrap();
    let librarian = lance_librarian(dir.path()).await;

    // Three qualifying records near axis 0, two orthogonal.
    librarian
        .store("t1", "exact", "h1", angled_embedding(0.0), HashMap::new(), false)
        .await
        .unwrap();
    librarian
        .store("t1", "near", "h2", angled_embedding(0.2), HashMap::new(), false)
        .await
        .unwrap();
    librarian
        .store("t1", "nearish", "h3", angled_embedding(0.4), HashMap::new(), false)
        .await
        .unwrap();
    librarian
        .store("t1", "far", "h4", axis_embedding(1), HashMap::new(), false)
        .await
        .unwrap();
    librarian
        .store("t1", "other-far", "h5", axis_embedding(2), HashMap::new(), false)
        .await
        .unwrap();

    let results = librarian
        .search("t1", &axis_embedding(0), 5, 0.8, &RecordFilter::default())
        .await
        .unwrap();

    assert_eq!(results.len(), 3, "only the three qualifying records return");
    assert_eq!(results[0].record.content, "exact");
    assert_eq!(results[1].record.content, "near");
    assert_eq!(results[2].record.content, "nearish");
    for result in &results {
        assert!(result.similarity >= 0.8);
    }
}

#[tokio::test]
async fn test_search_respects_limit() {
    let dir = tempdir().unwrap();
    let librarian = lance_librarian(dir.path()).await;

    for i in 0..6 {
        librarian
            .store(
                "t1",
                &format!("record {i}"),
                &format!("h{i}"),
                angled_embedding(0.01 * i as f32),
                HashMap::new(),
                false,
            )
            .await
            .unwrap();
    }

    let results = librarian
        .search("t1", &axis_embedding(0), 3, 0.0, &RecordFilter::default())
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
}

#[tokio::test]
async fn test_search_is_tenant_scoped() {
    let dir = tempdir().unwrap();
    let librarian = lance_librarian(dir.path()).await;

    librarian
        .store("t1", "mine", "h1", axis_embedding(0), HashMap::new(), false)
        .await
        .unwrap();
    librarian
        .store("t2", "theirs", "h2", axis_embedding(0), HashMap::new(), false)
        .await
        .unwrap();

    let results = librarian
        .search("t1", &axis_embedding(0), 10, 0.0, &RecordFilter::default())
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.content, "mine");
}

#[tokio::test]
async fn test_search_applies_tag_filter() {
    let dir = tempdir().unwrap();
    let librarian = lance_librarian(dir.path()).await;

    librarian
        .store(
            "t1",
            "from conversation",
            "h1",
            axis_embedding(0),
            HashMap::from([("origin".to_string(), "conversation".to_string())]),
            false,
        )
        .await
        .unwrap();
    librarian
        .store(
            "t1",
            "from file",
            "h2",
            axis_embedding(0),
            HashMap::from([("origin".to_string(), "file".to_string())]),
            false,
        )
        .await
        .unwrap();

    let filter = RecordFilter::new().with_tag("origin", "conversation");
    let results = librarian
        .search("t1", &axis_embedding(0), 10, 0.0, &filter)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.content, "from conversation");
}

#[tokio::test]
async fn test_mark_retained_then_purge_is_refused() {
    let dir = tempdir().unwrap();
    let librarian = lance_librarian(dir.path()).await;

    let id = librarian
        .store("t1", "keep me", "h1", axis_embedding(0), HashMap::new(), false)
        .await
        .unwrap()
        .memory_id();

    assert!(librarian.mark_retained("t1", id).await.unwrap());
    assert!(!librarian.purge("t1", id).await.unwrap());
    assert!(librarian.get("t1", id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_purge_removes_unretained_record() {
    let dir = tempdir().unwrap();
    let librarian = lance_librarian(dir.path()).await;

    let id = librarian
        .store("t1", "ephemeral", "h1", axis_embedding(0), HashMap::new(), false)
        .await
        .unwrap()
        .memory_id();

    assert!(librarian.purge("t1", id).await.unwrap());
    assert!(librarian.get("t1", id).await.unwrap().is_none());
    assert_eq!(librarian.usage("t1").await.unwrap().records, 0);
}

#[tokio::test]
async fn test_purge_older_than_spares_retained_and_fresh() {
    let dir = tempdir().unwrap();
    let backend = LanceArchive::connect(dir.path(), DIM, 4).await.unwrap();

    let mut stale = MemoryRecord::new("t1", "stale", "h1", axis_embedding(0), HashMap::new());
    stale.created_at = chrono::Utc::now() - chrono::Duration::days(40);
    backend.insert_unique(stale).await.unwrap();

    let mut kept = MemoryRecord::new("t1", "kept", "h2", axis_embedding(0), HashMap::new());
    kept.created_at = chrono::Utc::now() - chrono::Duration::days(40);
    kept.retained = true;
    backend.insert_unique(kept).await.unwrap();

    let fresh = MemoryRecord::new("t1", "fresh", "h3", axis_embedding(0), HashMap::new());
    backend.insert_unique(fresh).await.unwrap();

    let cutoff = chrono::Utc::now() - chrono::Duration::days(30);
    let purged = backend.purge_older_than("t1", cutoff).await.unwrap();

    assert_eq!(purged, 1);
    let usage = backend.usage("t1").await.unwrap();
    assert_eq!(usage.records, 2);
}

#[tokio::test]
async fn test_records_survive_reconnect() {
    let dir = tempdir().unwrap();

    let id = {
        let librarian = lance_librarian(dir.path()).await;
        librarian
            .store("t1", "durable", "h1", axis_embedding(0), HashMap::new(), false)
            .await
            .unwrap()
            .memory_id()
    };

    let librarian = lance_librarian(dir.path()).await;
    let record = librarian.get("t1", id).await.unwrap().expect("record persisted");
    assert_eq!(record.content, "durable");
}

#[tokio::test]
async fn test_embedding_dimension_is_enforced() {
    let dir = tempdir().unwrap();
    let librarian = lance_librarian(dir.path()).await;

    let result = librarian
        .store("t1", "bad dims", "h1", vec![0.5; DIM + 1], HashMap::new(), false)
        .await;
    assert!(result.is_err());

    let result = librarian
        .search("t1", &vec![0.5; DIM - 1], 5, 0.0, &RecordFilter::default())
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_fallback_ranks_identically_to_durable_backend() {
    let dir = tempdir().unwrap();
    let durable = LanceArchive::connect(dir.path(), DIM, 4).await.unwrap();
    let fallback = MemoryArchive::new();

    let thetas = [0.0_f32, 0.5, 0.25, 1.2, 0.75];
    for (i, theta) in thetas.iter().enumerate() {
        let record = MemoryRecord::new(
            "t1",
            format!("record {i}"),
            format!("h{i}"),
            angled_embedding(*theta),
            HashMap::new(),
        );
        durable.insert_unique(record.clone()).await.unwrap();
        fallback.insert_unique(record).await.unwrap();
    }

    let query = axis_embedding(0);
    let from_durable = durable
        .search("t1", &query, 4, 0.1, &RecordFilter::default())
        .await
        .unwrap();
    let from_fallback = fallback
        .search("t1", &query, 4, 0.1, &RecordFilter::default())
        .await
        .unwrap();

    assert_eq!(from_durable.len(), from_fallback.len());
    for (a, b) in from_durable.iter().zip(from_fallback.iter()) {
        assert_eq!(a.record.id, b.record.id);
        assert!((a.similarity - b.similarity).abs() < 1e-6);
    }
}
