use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::external::error::{StackError, StackResult};

/// A document returned by a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    #[serde(alias = "page_content")]
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl RetrievedDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A query as handed over by a caller, either already decoded or as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Text(String),
    Bytes(Vec<u8>),
}

impl Query {
    /// Decode the query into text. Raw bytes must be valid UTF-8.
    pub fn into_text(self) -> StackResult<String> {
        match self {
            Query::Text(text) => Ok(text),
            Query::Bytes(bytes) => String::from_utf8(bytes)
                .map_err(|e| StackError::InvalidQuery(format!("query is not valid UTF-8: {}", e))),
        }
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::Text(text.to_string())
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::Text(text)
    }
}

impl From<Vec<u8>> for Query {
    fn from(bytes: Vec<u8>) -> Self {
        Query::Bytes(bytes)
    }
}

impl From<&[u8]> for Query {
    fn from(bytes: &[u8]) -> Self {
        Query::Bytes(bytes.to_vec())
    }
}
