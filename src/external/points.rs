use anyhow::Result;
use async_trait::async_trait;
use qdrant_client::{
    config::QdrantConfig,
    qdrant::{
        point_id::PointIdOptions, points_selector::PointsSelectorOneOf, vectors_config::Config,
        vectors_output::VectorsOptions, CreateCollection, DeletePoints, Distance, Filter,
        GetPoints, PointId, PointStruct, PointsIdsList, PointsSelector, SearchPoints,
        UpsertPoints, VectorParams, VectorsConfig, VectorsOutput, WithPayloadSelector,
        WithVectorsSelector, WriteOrdering,
    },
    Qdrant,
};
use uuid::Uuid;

use crate::document::RetrievedDocument;
use crate::external::error::StackError;
use crate::external::payload::{document_payload, payload_document};

/// A document with its embedding, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub document: RetrievedDocument,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointQuery {
    pub vector: Vec<f32>,
    pub limit: usize,
    pub filter: Option<Filter>,
    pub score_threshold: Option<f32>,
    /// Return the stored vector of each hit.
    pub with_vectors: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: RetrievedDocument,
    pub score: f32,
    pub vector: Option<Vec<f32>>,
}

/// Raw point storage underneath a vector database.
#[async_trait]
pub trait PointStore: Send + Sync {
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    async fn create_collection(&self, name: &str, vector_size: usize) -> Result<()>;

    async fn upsert(&self, collection: &str, points: Vec<StoredPoint>) -> Result<()>;

    async fn search(&self, collection: &str, query: PointQuery) -> Result<Vec<ScoredDocument>>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<RetrievedDocument>>;

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()>;
}

/// Parse a document id: unsigned integers and UUIDs are accepted.
pub fn point_id(id: &str) -> Result<PointId> {
    let options = if let Ok(num) = id.parse::<u64>() {
        PointIdOptions::Num(num)
    } else if let Ok(uuid) = Uuid::parse_str(id) {
        PointIdOptions::Uuid(uuid.to_string())
    } else {
        return Err(StackError::VectorDBError(format!(
            "Invalid document id {:?}: expected integer or UUID",
            id
        ))
        .into());
    };

    Ok(PointId {
        point_id_options: Some(options),
    })
}

#[allow(deprecated)]
fn dense_vector(vectors: Option<VectorsOutput>) -> Option<Vec<f32>> {
    match vectors?.vectors_options? {
        VectorsOptions::Vector(vector) => Some(vector.data),
        VectorsOptions::Vectors(_) => None,
    }
}

/// [`PointStore`] over a Qdrant client.
pub struct QdrantPoints {
    client: Qdrant,
}

impl QdrantPoints {
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::new(QdrantConfig::from_url(url))
            .map_err(|e| StackError::ConnectionError(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PointStore for QdrantPoints {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let response = self
            .client
            .list_collections()
            .await
            .map_err(|e| StackError::VectorDBError(e.to_string()))?;

        Ok(response.collections.iter().any(|c| c.name == name))
    }

    async fn create_collection(&self, name: &str, vector_size: usize) -> Result<()> {
        let vectors_config = VectorsConfig {
            config: Some(Config::Params(VectorParams {
                size: vector_size as u64,
                distance: Distance::Cosine.into(),
                ..Default::default()
            })),
        };

        let create_collection = CreateCollection {
            collection_name: name.to_string(),
            vectors_config: Some(vectors_config),
            ..Default::default()
        };

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| StackError::VectorDBError(e.to_string()))?;

        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<StoredPoint>) -> Result<()> {
        let points = points
            .into_iter()
            .map(|p| {
                Ok(PointStruct {
                    id: Some(point_id(&p.id)?),
                    payload: document_payload(&p.document),
                    vectors: Some(p.vector.into()),
                    ..Default::default()
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let upsert_points = UpsertPoints {
            collection_name: collection.to_string(),
            wait: Some(true),
            points,
            ordering: Some(WriteOrdering::default()),
            ..Default::default()
        };

        self.client
            .upsert_points(upsert_points)
            .await
            .map_err(|e| StackError::VectorDBError(e.to_string()))?;

        Ok(())
    }

    async fn search(&self, collection: &str, query: PointQuery) -> Result<Vec<ScoredDocument>> {
        let search_request = SearchPoints {
            collection_name: collection.to_string(),
            vector: query.vector,
            limit: query.limit as u64,
            filter: query.filter,
            score_threshold: query.score_threshold,
            with_payload: Some(WithPayloadSelector::from(true)),
            with_vectors: Some(WithVectorsSelector::from(query.with_vectors)),
            ..Default::default()
        };

        let response = self
            .client
            .search_points(search_request)
            .await
            .map_err(|e| StackError::VectorDBError(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|p| {
                let vector = dense_vector(p.vectors);
                payload_document(p.payload).map(|document| ScoredDocument {
                    document,
                    score: p.score,
                    vector,
                })
            })
            .collect())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<RetrievedDocument>> {
        let request = GetPoints {
            collection_name: collection.to_string(),
            ids: vec![point_id(id)?],
            with_payload: Some(WithPayloadSelector::from(true)),
            ..Default::default()
        };

        let response = self
            .client
            .get_points(request)
            .await
            .map_err(|e| StackError::VectorDBError(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .next()
            .and_then(|p| payload_document(p.payload)))
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        let point_ids = ids
            .iter()
            .map(|id| point_id(id))
            .collect::<Result<Vec<_>>>()?;

        let points_selector = PointsSelector {
            points_selector_one_of: Some(PointsSelectorOneOf::Points(PointsIdsList {
                ids: point_ids,
            })),
        };

        let delete_points = DeletePoints {
            collection_name: collection.to_string(),
            wait: Some(true),
            points: Some(points_selector),
            ordering: Some(WriteOrdering::default()),
            ..Default::default()
        };

        self.client
            .delete_points(delete_points)
            .await
            .map_err(|e| StackError::VectorDBError(e.to_string()))?;

        Ok(())
    }
}
