use std::collections::HashMap;

use qdrant_client::qdrant::{value::Kind, ListValue, Struct, Value};
use serde_json::{Map, Number, Value as JsonValue};
use tracing::warn;

use crate::document::RetrievedDocument;

/// Payload field holding a document's text.
pub const CONTENT_KEY: &str = "page_content";

pub fn to_qdrant(value: JsonValue) -> Value {
    let kind = match value {
        JsonValue::Null => Kind::NullValue(0),
        JsonValue::Bool(b) => Kind::BoolValue(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        JsonValue::String(s) => Kind::StringValue(s),
        JsonValue::Array(items) => Kind::ListValue(ListValue {
            values: items.into_iter().map(to_qdrant).collect(),
        }),
        JsonValue::Object(fields) => Kind::StructValue(Struct {
            fields: fields.into_iter().map(|(k, v)| (k, to_qdrant(v))).collect(),
        }),
    };
    Value { kind: Some(kind) }
}

pub fn from_qdrant(value: Value) -> JsonValue {
    match value.kind {
        None | Some(Kind::NullValue(_)) => JsonValue::Null,
        Some(Kind::BoolValue(b)) => JsonValue::Bool(b),
        Some(Kind::IntegerValue(i)) => JsonValue::from(i),
        Some(Kind::DoubleValue(d)) => Number::from_f64(d).map_or(JsonValue::Null, JsonValue::Number),
        Some(Kind::StringValue(s)) => JsonValue::String(s),
        Some(Kind::ListValue(list)) => {
            JsonValue::Array(list.values.into_iter().map(from_qdrant).collect())
        }
        Some(Kind::StructValue(s)) => JsonValue::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, from_qdrant(v)))
                .collect(),
        ),
    }
}

/// Build the stored payload for a document: its text plus its metadata fields.
pub fn document_payload(document: &RetrievedDocument) -> HashMap<String, Value> {
    let mut payload: HashMap<String, Value> = document
        .metadata
        .iter()
        .map(|(k, v)| (k.clone(), to_qdrant(v.clone())))
        .collect();
    payload.insert(
        CONTENT_KEY.to_string(),
        to_qdrant(JsonValue::String(document.content.clone())),
    );
    payload
}

/// Rebuild a document from a stored payload. Payloads without text are skipped.
pub fn payload_document(payload: HashMap<String, Value>) -> Option<RetrievedDocument> {
    let mut metadata = Map::new();
    let mut content = None;

    for (key, value) in payload {
        match from_qdrant(value) {
            JsonValue::String(text) if key == CONTENT_KEY => content = Some(text),
            json => {
                metadata.insert(key, json);
            }
        }
    }

    match content {
        Some(content) => Some(RetrievedDocument { content, metadata }),
        None => {
            warn!("skipping stored point without `{}`", CONTENT_KEY);
            None
        }
    }
}
