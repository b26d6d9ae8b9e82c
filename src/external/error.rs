use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("Unsupported search method: {0}")]
    UnsupportedMethod(String),

    #[error("Malformed result: {0}")]
    MalformedResult(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(#[source] anyhow::Error),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Ollama error: {0}")]
    OllamaError(String),

    #[error("Vector DB error: {0}")]
    VectorDBError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StackResult<T> = std::result::Result<T, StackError>;
