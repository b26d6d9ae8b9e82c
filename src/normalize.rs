use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::document::RetrievedDocument;
use crate::external::error::{StackError, StackResult};

/// Output of a conversational retrieval chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResult {
    pub answer: String,
    pub source_documents: Vec<RetrievedDocument>,
}

/// Output of a plain retrieval QA chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaResult {
    pub result: String,
    pub source_documents: Vec<RetrievedDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    pub content: String,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub result: String,
    pub source_documents: Vec<NormalizedDocument>,
}

impl NormalizedResult {
    pub fn to_json(&self) -> StackResult<String> {
        serde_json::to_string(self).map_err(|e| StackError::Other(e.into()))
    }
}

impl From<&RetrievedDocument> for NormalizedDocument {
    fn from(doc: &RetrievedDocument) -> Self {
        Self {
            content: doc.content.clone(),
            metadata: doc.metadata.clone(),
        }
    }
}

impl From<ChatResult> for NormalizedResult {
    fn from(chat: ChatResult) -> Self {
        Self {
            result: chat.answer,
            source_documents: chat.source_documents.iter().map(Into::into).collect(),
        }
    }
}

impl From<QaResult> for NormalizedResult {
    fn from(qa: QaResult) -> Self {
        Self {
            result: qa.result,
            source_documents: qa.source_documents.iter().map(Into::into).collect(),
        }
    }
}

/// Normalize a raw chain result. `answer` wins over `result` when both are present.
pub fn normalize(raw: &Value) -> StackResult<NormalizedResult> {
    let object = raw
        .as_object()
        .ok_or_else(|| StackError::MalformedResult("result is not an object".to_string()))?;

    let result = match (object.get("answer"), object.get("result")) {
        (Some(answer), _) => text_field(answer, "answer")?,
        (None, Some(result)) => text_field(result, "result")?,
        (None, None) => {
            return Err(StackError::MalformedResult(
                "missing `answer` or `result`".to_string(),
            ))
        }
    };

    let documents = object
        .get("source_documents")
        .ok_or_else(|| StackError::MalformedResult("missing `source_documents`".to_string()))?
        .as_array()
        .ok_or_else(|| {
            StackError::MalformedResult("`source_documents` is not an array".to_string())
        })?;

    let source_documents = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| normalize_document(i, doc))
        .collect::<StackResult<Vec<_>>>()?;

    debug!(documents = source_documents.len(), "normalized result");
    Ok(NormalizedResult {
        result,
        source_documents,
    })
}

fn text_field(value: &Value, name: &str) -> StackResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| StackError::MalformedResult(format!("`{}` is not a string", name)))
}

fn normalize_document(index: usize, doc: &Value) -> StackResult<NormalizedDocument> {
    let content = doc
        .get("content")
        .or_else(|| doc.get("page_content"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            StackError::MalformedResult(format!("source document {} has no content", index))
        })?;

    let metadata = match doc.get("metadata") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(StackError::MalformedResult(format!(
                "source document {} has non-object metadata",
                index
            )))
        }
    };

    Ok(NormalizedDocument {
        content: content.to_string(),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_result() {
        let raw = json!({
            "answer": "A",
            "source_documents": [{"content": "c1", "metadata": {}}],
            "chat_history": [],
        });
        let normalized = normalize(&raw).unwrap();
        assert_eq!(
            serde_json::to_value(&normalized).unwrap(),
            json!({"result": "A", "source_documents": [{"content": "c1", "metadata": {}}]})
        );
    }

    #[test]
    fn test_qa_result() {
        let raw = json!({"result": "R", "source_documents": []});
        let normalized = normalize(&raw).unwrap();
        assert_eq!(normalized.result, "R");
        assert!(normalized.source_documents.is_empty());
        assert_eq!(
            normalized.to_json().unwrap(),
            r#"{"result":"R","source_documents":[]}"#
        );
    }

    #[test]
    fn test_drops_backend_fields() {
        let raw = json!({
            "result": "R",
            "source_documents": [{
                "page_content": "body",
                "metadata": {"source": "doc.md"},
                "type": "Document",
                "score": 0.42,
            }],
        });
        let normalized = normalize(&raw).unwrap();
        assert_eq!(
            serde_json::to_value(&normalized.source_documents[0]).unwrap(),
            json!({"content": "body", "metadata": {"source": "doc.md"}})
        );
    }

    #[test]
    fn test_answer_takes_precedence() {
        let raw = json!({"answer": "A", "result": "R", "source_documents": []});
        assert_eq!(normalize(&raw).unwrap().result, "A");
    }

    #[test]
    fn test_missing_keys() {
        for raw in [
            json!({"source_documents": []}),
            json!({"answer": "A"}),
            json!({"answer": "A", "source_documents": [{"metadata": {}}]}),
            json!({"answer": "A", "source_documents": [{"content": "c", "metadata": 3}]}),
            json!({"answer": 1, "source_documents": []}),
            json!("A"),
        ] {
            assert!(
                matches!(normalize(&raw), Err(StackError::MalformedResult(_))),
                "expected malformed result for {}",
                raw
            );
        }
    }

    #[test]
    fn test_idempotent() {
        let raw = json!({"answer": "A", "source_documents": [{"content": "c1"}]});
        assert_eq!(normalize(&raw).unwrap(), normalize(&raw).unwrap());
    }

    #[test]
    fn test_typed_conversions() {
        let doc = RetrievedDocument::new("c1").with_metadata("page", 3);
        let chat = ChatResult {
            answer: "A".to_string(),
            source_documents: vec![doc.clone()],
        };
        let from_chat = NormalizedResult::from(chat);
        let from_value = normalize(&json!({
            "answer": "A",
            "source_documents": [{"content": "c1", "metadata": {"page": 3}}],
        }))
        .unwrap();
        assert_eq!(from_chat, from_value);

        let qa = QaResult {
            result: "R".to_string(),
            source_documents: vec![doc],
        };
        assert_eq!(NormalizedResult::from(qa).result, "R");
    }
}
