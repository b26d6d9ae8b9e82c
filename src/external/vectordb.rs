use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use qdrant_client::qdrant::{Condition, Filter};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info};
use uuid::Uuid;

use crate::document::RetrievedDocument;
use crate::external::embedding::Embedder;
use crate::external::error::StackError;
use crate::external::mmr::maximal_marginal_relevance;
use crate::external::points::{PointQuery, PointStore, QdrantPoints, ScoredDocument, StoredPoint};
use crate::search::{SearchMethod, SearchOptions, VectorSearch};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDBConfig {
    pub collection_name: String,
    pub host: String,
    pub port: u16,
    pub vector_size: usize,
    pub search_method: SearchMethod,
    pub search_options: SearchOptions,
}

impl VectorDBConfig {
    /// Get the full URL for the Qdrant service
    pub fn get_url(&self) -> Result<String> {
        super::service_url(&self.host, self.port)
    }
}

impl Default for VectorDBConfig {
    fn default() -> Self {
        Self {
            collection_name: "documents".to_string(),
            host: "localhost".to_string(),
            port: 6334,
            vector_size: 768,
            search_method: SearchMethod::default(),
            search_options: SearchOptions::default(),
        }
    }
}

/// A vector database holding documents, on top of the two search capabilities.
#[async_trait]
pub trait VectorDB: VectorSearch {
    /// Create the backing collection if it does not exist yet.
    async fn create_index(&self) -> Result<()>;

    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Embed and store documents, returning their generated ids.
    async fn add_documents(&self, documents: Vec<RetrievedDocument>) -> Result<Vec<String>>;

    async fn get_document(&self, id: &str) -> Result<Option<RetrievedDocument>>;

    async fn create_document(
        &self,
        id: &str,
        document: RetrievedDocument,
    ) -> Result<RetrievedDocument>;

    /// Replace an existing document. Unknown ids are an error.
    async fn update_document(&self, id: &str, document: RetrievedDocument) -> Result<()>;

    async fn delete_documents(&self, ids: &[String]) -> Result<()>;
}

/// Translate equality filters into a Qdrant filter.
///
/// Only strings, booleans and integers that fit in `i64` can be matched exactly;
/// any other value is rejected rather than dropped from the filter.
pub fn equality_filter(filter: &Map<String, JsonValue>) -> Result<Option<Filter>> {
    let conditions = filter
        .iter()
        .map(|(field, value)| match value {
            JsonValue::String(s) => Ok(Condition::matches(field.clone(), s.clone())),
            JsonValue::Bool(b) => Ok(Condition::matches(field.clone(), *b)),
            JsonValue::Number(n) if n.is_i64() => match n.as_i64() {
                Some(i) => Ok(Condition::matches(field.clone(), i)),
                None => Err(unsupported_filter(field, value)),
            },
            other => Err(unsupported_filter(field, other)),
        })
        .collect::<Result<Vec<Condition>>>()?;

    if conditions.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Filter::must(conditions)))
    }
}

fn unsupported_filter(field: &str, value: &JsonValue) -> anyhow::Error {
    StackError::VectorDBError(format!(
        "Unsupported filter value for `{}`: {} (expected string, bool or integer)",
        field, value
    ))
    .into()
}

/// Vector database over a [`PointStore`]; text is embedded through an [`Embedder`].
pub struct QdrantVectorDB {
    points: Arc<dyn PointStore>,
    embedder: Arc<dyn Embedder>,
    config: VectorDBConfig,
}

impl QdrantVectorDB {
    /// Create a new vector database client with the given configuration
    pub fn new(config: VectorDBConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let points = Arc::new(QdrantPoints::new(&config.get_url()?)?);
        Ok(Self::with_store(config, points, embedder))
    }

    pub fn with_store(
        config: VectorDBConfig,
        points: Arc<dyn PointStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            points,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &VectorDBConfig {
        &self.config
    }

    async fn search_scored(
        &self,
        vector: Vec<f32>,
        limit: usize,
        options: &SearchOptions,
        with_vectors: bool,
    ) -> Result<Vec<ScoredDocument>> {
        let filter = match options.filter() {
            Some(filter) => equality_filter(filter)?,
            None => None,
        };

        let query = PointQuery {
            vector,
            limit,
            filter,
            score_threshold: options.score_threshold(),
            with_vectors,
        };

        self.points.search(&self.config.collection_name, query).await
    }

    async fn point(&self, id: &str, document: RetrievedDocument) -> Result<StoredPoint> {
        let vector = self.embedder.embed(&document.content).await?;
        Ok(StoredPoint {
            id: id.to_string(),
            vector,
            document,
        })
    }
}

#[async_trait]
impl VectorSearch for QdrantVectorDB {
    async fn similarity_search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedDocument>> {
        let vector = self.embedder.embed(query).await?;
        let hits = self.search_scored(vector, options.k(), options, false).await?;

        Ok(hits.into_iter().map(|h| h.document).collect())
    }

    async fn max_marginal_relevance_search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedDocument>> {
        let vector = self.embedder.embed(query).await?;
        let fetch_k = options.fetch_k().max(options.k());
        let hits = self.search_scored(vector.clone(), fetch_k, options, true).await?;

        let mut documents = Vec::with_capacity(hits.len());
        let mut embeddings = Vec::with_capacity(hits.len());
        for hit in hits {
            let stored = hit.vector.ok_or_else(|| {
                StackError::VectorDBError("search hit has no stored dense vector".to_string())
            })?;
            embeddings.push(stored);
            documents.push(hit.document);
        }

        let selected =
            maximal_marginal_relevance(&vector, &embeddings, options.k(), options.lambda_mult());
        debug!(
            candidates = documents.len(),
            selected = selected.len(),
            "mmr re-ranked candidates"
        );

        Ok(selected.into_iter().map(|i| documents[i].clone()).collect())
    }
}

#[async_trait]
impl VectorDB for QdrantVectorDB {
    async fn create_index(&self) -> Result<()> {
        let name = &self.config.collection_name;
        if self.points.collection_exists(name).await? {
            debug!(collection = %name, "collection already exists");
            return Ok(());
        }

        self.points
            .create_collection(name, self.config.vector_size)
            .await?;
        info!(collection = %name, "created collection");
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.points.collection_exists(name).await
    }

    async fn add_documents(&self, documents: Vec<RetrievedDocument>) -> Result<Vec<String>> {
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let points: Vec<StoredPoint> = documents
            .into_iter()
            .zip(vectors)
            .map(|(document, vector)| StoredPoint {
                id: Uuid::new_v4().to_string(),
                vector,
                document,
            })
            .collect();
        let ids: Vec<String> = points.iter().map(|p| p.id.clone()).collect();

        self.points
            .upsert(&self.config.collection_name, points)
            .await?;
        debug!(count = ids.len(), "added documents");
        Ok(ids)
    }

    async fn get_document(&self, id: &str) -> Result<Option<RetrievedDocument>> {
        self.points.get(&self.config.collection_name, id).await
    }

    async fn create_document(
        &self,
        id: &str,
        document: RetrievedDocument,
    ) -> Result<RetrievedDocument> {
        let point = self.point(id, document).await?;
        let document = point.document.clone();
        self.points
            .upsert(&self.config.collection_name, vec![point])
            .await?;
        Ok(document)
    }

    async fn update_document(&self, id: &str, document: RetrievedDocument) -> Result<()> {
        if self.get_document(id).await?.is_none() {
            return Err(StackError::VectorDBError(format!("Document not found: {}", id)).into());
        }

        let point = self.point(id, document).await?;
        self.points
            .upsert(&self.config.collection_name, vec![point])
            .await
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<()> {
        self.points.delete(&self.config.collection_name, ids).await
    }
}
