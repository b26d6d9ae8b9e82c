use anyhow::Result;
use async_trait::async_trait;
use ollama_rs::{
    generation::{completion::request::GenerationRequest, options::GenerationOptions},
    Ollama,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::external::{error::StackError, ollama_client};
use crate::generation::{flatten, Generation, GenerationNode};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub model: String,
    pub host: String,
    pub port: u16,
    pub temperature: f32,
    pub top_p: f32,
    /// Answer through the conversational retrieval chain.
    pub chat: bool,
}

impl LLMConfig {
    /// Get the full URL for the Ollama service
    pub fn get_url(&self) -> Result<String> {
        super::service_url(&self.host, self.port)
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            model: "orca-mini".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            temperature: 0.7,
            top_p: 0.9,
            chat: false,
        }
    }
}

/// A language model producing candidate generations for a prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Vec<Generation>>;

    /// Generate and concatenate the text of all candidates.
    async fn complete(&self, prompt: &str) -> Result<String> {
        let generations = self.generate(prompt).await?;
        Ok(flatten(&[GenerationNode::from(generations)]))
    }
}

/// Wrapper for Ollama LLM engine
pub struct LLMEngine {
    client: Ollama,
    config: LLMConfig,
}

impl LLMEngine {
    /// Create a new LLM engine with the given configuration
    pub fn new(config: LLMConfig) -> Result<Self> {
        let client = ollama_client(&config.get_url()?, config.port)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LLMConfig {
        &self.config
    }
}

#[async_trait]
impl TextGenerator for LLMEngine {
    async fn generate(&self, prompt: &str) -> Result<Vec<Generation>> {
        let mut request = GenerationRequest::new(self.config.model.clone(), prompt.to_string());

        let options = GenerationOptions::default()
            .temperature(self.config.temperature)
            .top_p(self.config.top_p);

        request.options = Some(options);

        debug!(model = %self.config.model, "requesting completion");
        let response = self
            .client
            .generate(request)
            .await
            .map_err(|e| StackError::OllamaError(e.to_string()))?;

        let mut info = Map::new();
        info.insert("model".to_string(), Value::from(response.model));
        info.insert("done".to_string(), Value::from(response.done));

        Ok(vec![Generation {
            text: response.response,
            generation_info: Some(info),
        }])
    }
}
