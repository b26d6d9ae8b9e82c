mod embedding;
pub mod error;
mod llm;
mod mmr;
mod payload;
pub mod points;
pub mod vectordb;

use anyhow::Result;
use ollama_rs::Ollama;
use url::Url;

pub use embedding::{Embedder, EmbeddingConfig, EmbeddingEngine};
pub use error::{StackError, StackResult};
pub use llm::{LLMConfig, LLMEngine, TextGenerator};
pub use mmr::{cosine_similarity, maximal_marginal_relevance};
pub use points::{PointQuery, PointStore, QdrantPoints, ScoredDocument, StoredPoint};
pub use vectordb::{equality_filter, QdrantVectorDB, VectorDB, VectorDBConfig};

/// Build a service URL from a host that may or may not carry a scheme.
pub(crate) fn service_url(host: &str, port: u16) -> Result<String> {
    let url = if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}:{}", host.trim_end_matches('/'), port)
    } else {
        format!("http://{}:{}", host, port)
    };

    // Validate the URL
    Url::parse(&url).map_err(|e| StackError::ConfigError(format!("Invalid URL: {}", e)))?;

    Ok(url)
}

pub(crate) fn ollama_client(url: &str, port: u16) -> Result<Ollama> {
    let url =
        Url::parse(url).map_err(|e| StackError::ConfigError(format!("Invalid URL: {}", e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| StackError::ConfigError(format!("URL has no host: {}", url)))?;

    Ok(Ollama::new(format!("{}://{}", url.scheme(), host), port))
}
