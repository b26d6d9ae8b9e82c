use std::env;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::external::{EmbeddingConfig, LLMConfig, StackError, VectorDBConfig};
use crate::search::{BackendPolicy, SearchMethod, SearchOptions};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub llm: LLMConfig,
    pub vector_db: VectorDBConfig,
    pub backend: BackendPolicy,
    pub log_level: String,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let host = var_or("OLLAMA_HOST", "localhost");
        let port = parsed_or("OLLAMA_PORT", 11434);

        // Load embedding config
        let embedding = EmbeddingConfig {
            model: var_or("OLLAMA_EMBEDDING_MODEL", "nomic-embed-text"),
            host: host.clone(),
            port,
        };

        // Load LLM config
        let llm = LLMConfig {
            model: var_or("OLLAMA_LLM_MODEL", "orca-mini"),
            host,
            port,
            temperature: parsed_or("OLLAMA_TEMPERATURE", 0.7),
            top_p: parsed_or("OLLAMA_TOP_P", 0.9),
            chat: parsed_or("LLM_CHAT", false),
        };

        // An unknown search method is an error, never a silent default
        let search_method: SearchMethod =
            var_or("VECTORDB_SEARCH_METHOD", "similarity_search").parse()?;
        let search_options = match env::var("VECTORDB_SEARCH_OPTIONS") {
            Ok(raw) => SearchOptions::from_json(&raw)?,
            Err(_) => SearchOptions::default(),
        };

        // Load vector DB config
        let vector_db = VectorDBConfig {
            collection_name: var_or("QDRANT_COLLECTION", "documents"),
            host: var_or("QDRANT_HOST", "localhost"),
            port: parsed_or("QDRANT_PORT", 6334),
            vector_size: parsed_or("QDRANT_VECTOR_SIZE", 768),
            search_method,
            search_options,
        };

        let timeout = match env::var("BACKEND_TIMEOUT_SECS") {
            Ok(raw) => Some(Duration::from_secs(raw.parse().map_err(|e| {
                StackError::ConfigError(format!("Invalid BACKEND_TIMEOUT_SECS: {}", e))
            })?)),
            Err(_) => None,
        };
        let backend = BackendPolicy {
            max_retries: parsed_or("BACKEND_MAX_RETRIES", 0),
            backoff: Duration::from_millis(parsed_or("BACKEND_BACKOFF_MS", 200)),
            timeout,
        };

        Ok(Self {
            embedding,
            llm,
            vector_db,
            backend,
            log_level: var_or("LOG_LEVEL", "info"),
        })
    }
}
