use super::*;
use crate::index::{DistanceMetric, Document};

fn entry(id: &str, text: &str, vector: Vec<f32>) -> IndexEntry {
    IndexEntry {
        document: Document::new(id, text).with_metadata("source", "test"),
        vector,
    }
}

fn create_test_index(metric: DistanceMetric) -> InMemoryIndex {
    InMemoryIndex::from_entries(
        IndexManifest::new("test-embed", 3, metric),
        vec![
            entry("a", "north", vec![0.0, 1.0, 0.0]),
            entry("b", "east", vec![1.0, 0.0, 0.0]),
            entry("c", "north-east", vec![0.7, 0.7, 0.0]),
            entry("d", "up", vec![0.0, 0.0, 1.0]),
        ],
    )
    .expect("should build index")
}

#[tokio::test]
async fn search_orders_by_increasing_distance() {
    let index = create_test_index(DistanceMetric::Cosine);

    let results = index
        .search(&[1.0, 0.1, 0.0], 3)
        .await
        .expect("search should succeed");

    let ids: Vec<&str> = results.iter().map(|r| r.document.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c", "a"]);
    assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(results[0].document.metadata["source"], "test");
}

#[tokio::test]
async fn search_never_returns_more_than_k_or_stored() {
    let index = create_test_index(DistanceMetric::Cosine);

    let one = index.search(&[0.0, 1.0, 0.0], 1).await.expect("search");
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].document.id, "a");
    assert!((one[0].score - 1.0).abs() < 1e-6);

    let all = index.search(&[0.0, 1.0, 0.0], 50).await.expect("search");
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn l2_metric_uses_squared_distance() {
    let index = create_test_index(DistanceMetric::L2);

    let results = index.search(&[0.0, 0.0, 1.0], 2).await.expect("search");
    assert_eq!(results[0].document.id, "d");
    assert!(results[0].distance.abs() < 1e-6);
    assert!((results[0].score - 1.0).abs() < 1e-6);
    // 0.7^2 + 0.7^2 + 1^2
    assert_eq!(results[1].document.id, "c");
    assert!((results[1].distance - 1.98).abs() < 1e-5);
}

#[tokio::test]
async fn ties_keep_insertion_order() {
    let index = InMemoryIndex::from_entries(
        IndexManifest::new("test-embed", 2, DistanceMetric::Cosine),
        vec![
            entry("first", "same", vec![1.0, 0.0]),
            entry("second", "same", vec![2.0, 0.0]),
            entry("third", "same", vec![3.0, 0.0]),
        ],
    )
    .expect("should build index");

    for _ in 0..3 {
        let results = index.search(&[1.0, 0.0], 3).await.expect("search");
        let ids: Vec<&str> = results.iter().map(|r| r.document.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }
}

#[tokio::test]
async fn empty_index_returns_no_results() {
    let index = InMemoryIndex::from_entries(
        IndexManifest::new("test-embed", 3, DistanceMetric::Cosine),
        Vec::new(),
    )
    .expect("should build empty index");

    assert_eq!(index.count().await.expect("count"), 0);
    assert!(index.search(&[1.0, 0.0, 0.0], 3).await.expect("search").is_empty());
}

#[tokio::test]
async fn rejects_zero_k_and_wrong_dimension() {
    let index = create_test_index(DistanceMetric::Cosine);

    assert!(matches!(
        index.search(&[1.0, 0.0, 0.0], 0).await,
        Err(AssistantError::InvalidInput(_))
    ));
    assert!(matches!(
        index.search(&[1.0, 0.0], 3).await,
        Err(AssistantError::IndexVersionMismatch { .. })
    ));
}

#[test]
fn rejects_entries_with_wrong_dimension() {
    let result = InMemoryIndex::from_entries(
        IndexManifest::new("test-embed", 3, DistanceMetric::Cosine),
        vec![entry("bad", "short", vec![1.0, 0.0])],
    );
    assert!(matches!(result, Err(AssistantError::Index(_))));
}

#[test]
fn manifest_counts_documents() {
    let index = create_test_index(DistanceMetric::Cosine);
    assert_eq!(index.manifest().document_count, 4);
    assert_eq!(index.entries().len(), 4);
}
