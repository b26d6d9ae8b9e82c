use anyhow::Result;
use async_trait::async_trait;
use futures::future::try_join_all;
use ollama_rs::{generation::options::GenerationOptions, Ollama};
use serde::{Deserialize, Serialize};

use crate::external::{error::StackError, ollama_client};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub host: String,
    pub port: u16,
}

impl EmbeddingConfig {
    /// Get the full URL for the Ollama service
    pub fn get_url(&self) -> Result<String> {
        super::service_url(&self.host, self.port)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_string(),
            host: "localhost".to_string(),
            port: 11434,
        }
    }
}

/// Turns text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        try_join_all(texts.iter().map(|t| self.embed(t))).await
    }
}

/// Wrapper for Ollama embedding engine
pub struct EmbeddingEngine {
    client: Ollama,
    config: EmbeddingConfig,
}

impl EmbeddingEngine {
    /// Create a new embedding engine with the given configuration
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = ollama_client(&config.get_url()?, config.port)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Embedder for EmbeddingEngine {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .generate_embeddings(
                self.config.model.clone(),
                text.to_string(),
                Some(GenerationOptions::default()),
            )
            .await
            .map_err(|e| StackError::OllamaError(e.to_string()))?;

        // Convert from Vec<f64> to Vec<f32>
        Ok(response.embeddings.into_iter().map(|x| x as f32).collect())
    }
}
