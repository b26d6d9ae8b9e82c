use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::document::RetrievedDocument;
use crate::external::error::{StackError, StackResult};

pub const DEFAULT_K: usize = 4;
pub const DEFAULT_FETCH_K: usize = 20;
pub const DEFAULT_LAMBDA_MULT: f32 = 0.5;

/// Retrieval strategy selected per configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SearchMethod {
    #[default]
    #[serde(rename = "similarity_search")]
    Similarity,
    #[serde(rename = "max_marginal_relevance_search")]
    MaxMarginalRelevance,
}

impl SearchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMethod::Similarity => "similarity_search",
            SearchMethod::MaxMarginalRelevance => "max_marginal_relevance_search",
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMethod {
    type Err = StackError;

    fn from_str(s: &str) -> StackResult<Self> {
        match s.trim() {
            "similarity_search" => Ok(SearchMethod::Similarity),
            "max_marginal_relevance_search" => Ok(SearchMethod::MaxMarginalRelevance),
            other => Err(StackError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// Backend-specific search options. The dispatcher never looks inside; adapters
/// read the keys they understand.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchOptions(Map<String, Value>);

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a JSON object literal.
    pub fn from_json(raw: &str) -> StackResult<Self> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(other) => Err(StackError::ConfigError(format!(
                "search options must be a JSON object, got {}",
                other
            ))),
            Err(e) => Err(StackError::ConfigError(format!(
                "Invalid search options: {}",
                e
            ))),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Number of documents to return.
    pub fn k(&self) -> usize {
        self.usize_or("k", DEFAULT_K)
    }

    /// Number of candidates fetched before MMR re-ranking.
    pub fn fetch_k(&self) -> usize {
        self.usize_or("fetch_k", DEFAULT_FETCH_K)
    }

    /// Relevance/diversity trade-off for MMR, clamped to [0, 1].
    pub fn lambda_mult(&self) -> f32 {
        self.0
            .get("lambda_mult")
            .and_then(Value::as_f64)
            .map(|v| v as f32)
            .unwrap_or(DEFAULT_LAMBDA_MULT)
            .clamp(0.0, 1.0)
    }

    pub fn score_threshold(&self) -> Option<f32> {
        self.0
            .get("score_threshold")
            .and_then(Value::as_f64)
            .map(|v| v as f32)
    }

    pub fn filter(&self) -> Option<&Map<String, Value>> {
        self.0.get("filter").and_then(Value::as_object)
    }

    fn usize_or(&self, key: &str, default: usize) -> usize {
        match self.0.get(key) {
            None => default,
            Some(value) => match value.as_u64() {
                Some(v) => v as usize,
                None => {
                    warn!(key, %value, default, "ignoring non-integer search option");
                    default
                }
            },
        }
    }
}

impl From<Map<String, Value>> for SearchOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// The two retrieval capabilities a vector store must offer.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn similarity_search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedDocument>>;

    async fn max_marginal_relevance_search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedDocument>>;
}

#[async_trait]
impl<T: VectorSearch + ?Sized> VectorSearch for std::sync::Arc<T> {
    async fn similarity_search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedDocument>> {
        (**self).similarity_search(query, options).await
    }

    async fn max_marginal_relevance_search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedDocument>> {
        (**self).max_marginal_relevance_search(query, options).await
    }
}

/// How backend calls are guarded. The default makes a single attempt with no timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
    pub timeout: Option<Duration>,
}

impl Default for BackendPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::from_millis(200),
            timeout: None,
        }
    }
}

/// Run a single search against `store` with the given method.
pub async fn search(
    store: &dyn VectorSearch,
    query: &str,
    method: SearchMethod,
    options: &SearchOptions,
) -> StackResult<Vec<RetrievedDocument>> {
    validate_query(query)?;
    debug!(%method, "dispatching search");
    call_backend(store, query, method, options)
        .await
        .map_err(StackError::BackendUnavailable)
}

fn validate_query(query: &str) -> StackResult<()> {
    if query.trim().is_empty() {
        return Err(StackError::InvalidQuery("query must not be empty".to_string()));
    }
    Ok(())
}

async fn call_backend(
    store: &dyn VectorSearch,
    query: &str,
    method: SearchMethod,
    options: &SearchOptions,
) -> Result<Vec<RetrievedDocument>> {
    match method {
        SearchMethod::Similarity => store.similarity_search(query, options).await,
        SearchMethod::MaxMarginalRelevance => {
            store.max_marginal_relevance_search(query, options).await
        }
    }
}

/// A vector store bound to the method and options of one configured component.
pub struct QueryDispatcher<S: VectorSearch> {
    store: S,
    method: SearchMethod,
    options: SearchOptions,
    policy: BackendPolicy,
}

impl<S: VectorSearch> QueryDispatcher<S> {
    pub fn new(store: S, method: SearchMethod, options: SearchOptions) -> Self {
        Self {
            store,
            method,
            options,
            policy: BackendPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: BackendPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn method(&self) -> SearchMethod {
        self.method
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Search with the configured method, applying the backend policy.
    pub async fn search(&self, query: &str) -> StackResult<Vec<RetrievedDocument>> {
        validate_query(query)?;
        debug!(method = %self.method, "dispatching search");

        let mut attempt = 0;
        loop {
            match self.attempt(query).await {
                Ok(docs) => {
                    debug!(count = docs.len(), "search returned documents");
                    return Ok(docs);
                }
                Err(e) if attempt < self.policy.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "backend search failed, retrying");
                    tokio::time::sleep(self.policy.backoff * attempt).await;
                }
                Err(e) => return Err(StackError::BackendUnavailable(e)),
            }
        }
    }

    async fn attempt(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        let call = call_backend(&self.store, query, self.method, &self.options);
        match self.policy.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| anyhow!("backend call timed out after {:?}", limit))?,
            None => call.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_parsing() {
        assert_eq!(
            "similarity_search".parse::<SearchMethod>().unwrap(),
            SearchMethod::Similarity
        );
        assert_eq!(
            "max_marginal_relevance_search".parse::<SearchMethod>().unwrap(),
            SearchMethod::MaxMarginalRelevance
        );

        let err = "mmr".parse::<SearchMethod>().unwrap_err();
        assert!(matches!(err, StackError::UnsupportedMethod(m) if m == "mmr"));
    }

    #[test]
    fn test_method_serde_names() {
        let method: SearchMethod =
            serde_json::from_value(json!("max_marginal_relevance_search")).unwrap();
        assert_eq!(method, SearchMethod::MaxMarginalRelevance);
        assert_eq!(
            serde_json::to_value(SearchMethod::Similarity).unwrap(),
            json!("similarity_search")
        );
        assert!(serde_json::from_value::<SearchMethod>(json!("keyword")).is_err());
    }

    #[test]
    fn test_option_defaults() {
        let options = SearchOptions::new();
        assert_eq!(options.k(), DEFAULT_K);
        assert_eq!(options.fetch_k(), DEFAULT_FETCH_K);
        assert_eq!(options.lambda_mult(), DEFAULT_LAMBDA_MULT);
        assert!(options.score_threshold().is_none());
        assert!(options.filter().is_none());
    }

    #[test]
    fn test_option_values() {
        let options =
            SearchOptions::from_json(r#"{"k": 2, "fetch_k": 10, "lambda_mult": 1.7, "filter": {"lang": "en"}}"#)
                .unwrap();
        assert_eq!(options.k(), 2);
        assert_eq!(options.fetch_k(), 10);
        assert_eq!(options.lambda_mult(), 1.0);
        assert_eq!(options.filter().unwrap()["lang"], "en");
    }

    #[test]
    fn test_non_integer_counts_fall_back() {
        let options = SearchOptions::new()
            .with("k", 2.0)
            .with("fetch_k", "3");
        assert_eq!(options.k(), DEFAULT_K);
        assert_eq!(options.fetch_k(), DEFAULT_FETCH_K);

        let options = SearchOptions::new().with("k", -1);
        assert_eq!(options.k(), DEFAULT_K);
    }

    #[test]
    fn test_options_must_be_object() {
        assert!(matches!(
            SearchOptions::from_json("[1, 2]"),
            Err(StackError::ConfigError(_))
        ));
        assert!(matches!(
            SearchOptions::from_json("{k: 2"),
            Err(StackError::ConfigError(_))
        ));
    }
}
