use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use genai_stack::external::{
    Embedder, PointQuery, PointStore, ScoredDocument, StoredPoint, VectorDB, VectorDBConfig,
};
use genai_stack::search::{SearchOptions, VectorSearch};
use genai_stack::{QdrantVectorDB, RetrievedDocument, StackError};
use mockall::{mock, predicate};
use serde_json::json;

mock! {
    pub Points {}

    #[async_trait]
    impl PointStore for Points {
        async fn collection_exists(&self, name: &str) -> Result<bool>;
        async fn create_collection(&self, name: &str, vector_size: usize) -> Result<()>;
        async fn upsert(&self, collection: &str, points: Vec<StoredPoint>) -> Result<()>;
        async fn search(&self, collection: &str, query: PointQuery) -> Result<Vec<ScoredDocument>>;
        async fn get(&self, collection: &str, id: &str) -> Result<Option<RetrievedDocument>>;
        async fn delete(&self, collection: &str, ids: &[String]) -> Result<()>;
    }
}

mock! {
    pub Embed {}

    #[async_trait]
    impl Embedder for Embed {
        async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    }
}

fn db(points: MockPoints, embedder: MockEmbed) -> QdrantVectorDB {
    QdrantVectorDB::with_store(
        VectorDBConfig::default(),
        Arc::new(points),
        Arc::new(embedder),
    )
}

fn query_embedder(vector: Vec<f32>) -> MockEmbed {
    let mut embedder = MockEmbed::new();
    embedder
        .expect_embed()
        .times(1)
        .returning(move |_| Ok(vector.clone()));
    embedder
}

fn hit(content: &str, vector: Option<Vec<f32>>) -> ScoredDocument {
    ScoredDocument {
        document: RetrievedDocument::new(content),
        score: 0.0,
        vector,
    }
}

fn is_vectordb_error(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<StackError>(),
        Some(StackError::VectorDBError(_))
    )
}

#[tokio::test]
async fn test_create_index_skips_existing_collection() {
    let mut points = MockPoints::new();
    points
        .expect_collection_exists()
        .with(predicate::function(|name: &str| name == "documents"))
        .times(1)
        .returning(|_| Ok(true));
    points.expect_create_collection().never();

    db(points, MockEmbed::new()).create_index().await.unwrap();
}

#[tokio::test]
async fn test_create_index_creates_missing_collection() {
    let mut points = MockPoints::new();
    points
        .expect_collection_exists()
        .times(1)
        .returning(|_| Ok(false));
    points
        .expect_create_collection()
        .with(
            predicate::function(|name: &str| name == "documents"),
            predicate::eq(768),
        )
        .times(1)
        .returning(|_, _| Ok(()));

    db(points, MockEmbed::new()).create_index().await.unwrap();
}

#[tokio::test]
async fn test_update_unknown_document_fails() {
    let mut points = MockPoints::new();
    points
        .expect_get()
        .with(
            predicate::function(|collection: &str| collection == "documents"),
            predicate::function(|id: &str| id == "42"),
        )
        .times(1)
        .returning(|_, _| Ok(None));
    points.expect_upsert().never();

    let mut embedder = MockEmbed::new();
    embedder.expect_embed().never();

    let err = db(points, embedder)
        .update_document("42", RetrievedDocument::new("new text"))
        .await
        .unwrap_err();
    assert!(is_vectordb_error(&err));
}

#[tokio::test]
async fn test_update_existing_document_upserts_same_id() {
    let mut points = MockPoints::new();
    points
        .expect_get()
        .times(1)
        .returning(|_, _| Ok(Some(RetrievedDocument::new("old text"))));
    points
        .expect_upsert()
        .withf(|collection, points| {
            collection == "documents"
                && points.len() == 1
                && points[0].id == "42"
                && points[0].document.content == "new text"
                && points[0].vector == vec![0.5, 0.5]
        })
        .times(1)
        .returning(|_, _| Ok(()));

    db(points, query_embedder(vec![0.5, 0.5]))
        .update_document("42", RetrievedDocument::new("new text"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_add_documents_returns_generated_ids() {
    let mut points = MockPoints::new();
    points
        .expect_upsert()
        .withf(|_, points| points.len() == 2 && points[0].id != points[1].id)
        .times(1)
        .returning(|_, _| Ok(()));

    let mut embedder = MockEmbed::new();
    embedder
        .expect_embed()
        .times(2)
        .returning(|text| Ok(vec![text.len() as f32]));

    let ids = db(points, embedder)
        .add_documents(vec![
            RetrievedDocument::new("first"),
            RetrievedDocument::new("second"),
        ])
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids.iter().all(|id| uuid::Uuid::parse_str(id).is_ok()));
}

#[tokio::test]
async fn test_similarity_search_builds_point_query() {
    let mut points = MockPoints::new();
    points
        .expect_search()
        .withf(|collection, query| {
            collection == "documents"
                && query.vector == vec![1.0, 0.0]
                && query.limit == 2
                && !query.with_vectors
                && query.score_threshold == Some(0.5)
                && query.filter.as_ref().map(|f| f.must.len()) == Some(2)
        })
        .times(1)
        .returning(|_, _| Ok(vec![hit("a", None), hit("b", None)]));

    let options = SearchOptions::new()
        .with("k", 2)
        .with("score_threshold", 0.5)
        .with("filter", json!({"lang": "en", "year": 2023}));
    let results = db(points, query_embedder(vec![1.0, 0.0]))
        .similarity_search("rust", &options)
        .await
        .unwrap();

    let contents: Vec<&str> = results.iter().map(|d| d.content.as_str()).collect();
    assert_eq!(contents, ["a", "b"]);
}

#[tokio::test]
async fn test_unsupported_filter_never_reaches_backend() {
    let mut points = MockPoints::new();
    points.expect_search().never();

    let mut embedder = MockEmbed::new();
    embedder.expect_embed().returning(|_| Ok(vec![1.0, 0.0]));

    let options = SearchOptions::new().with("filter", json!({"lang": "en", "score": 0.5}));
    let err = db(points, embedder)
        .similarity_search("rust", &options)
        .await
        .unwrap_err();
    assert!(is_vectordb_error(&err));
}

#[tokio::test]
async fn test_mmr_reranks_stored_vectors() {
    let mut points = MockPoints::new();
    points
        .expect_search()
        .withf(|_, query| query.with_vectors && query.limit == 10)
        .times(1)
        .returning(|_, _| {
            Ok(vec![
                hit("c0", Some(vec![1.0, 0.0])),
                hit("c1", Some(vec![0.99, 0.01])),
                hit("c2", Some(vec![0.0, 1.0])),
            ])
        });

    // Only the query is embedded; candidates are ranked on their stored vectors.
    let options = SearchOptions::new()
        .with("k", 2)
        .with("fetch_k", 10)
        .with("lambda_mult", 0.5);
    let results = db(points, query_embedder(vec![1.0, 0.5]))
        .max_marginal_relevance_search("rust", &options)
        .await
        .unwrap();

    let contents: Vec<&str> = results.iter().map(|d| d.content.as_str()).collect();
    assert_eq!(contents, ["c1", "c2"]);
}

#[tokio::test]
async fn test_mmr_fetches_at_least_k_candidates() {
    let mut points = MockPoints::new();
    points
        .expect_search()
        .withf(|_, query| query.limit == 5)
        .times(1)
        .returning(|_, _| Ok(vec![]));

    let options = SearchOptions::new().with("k", 5).with("fetch_k", 3);
    let results = db(points, query_embedder(vec![1.0]))
        .max_marginal_relevance_search("rust", &options)
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_mmr_requires_stored_vectors() {
    let mut points = MockPoints::new();
    points
        .expect_search()
        .times(1)
        .returning(|_, _| Ok(vec![hit("c0", Some(vec![1.0, 0.0])), hit("c1", None)]));

    let err = db(points, query_embedder(vec![1.0, 0.0]))
        .max_marginal_relevance_search("rust", &SearchOptions::new())
        .await
        .unwrap_err();
    assert!(is_vectordb_error(&err));
}
