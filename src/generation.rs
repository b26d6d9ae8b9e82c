use std::convert::Infallible;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::external::error::{StackError, StackResult};

/// A single candidate output produced by a language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_info: Option<Map<String, Value>>,
}

impl Generation {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            generation_info: None,
        }
    }
}

/// An arbitrarily nested tree of generations as returned by batched calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerationNode {
    Generation(Generation),
    Nested(Vec<GenerationNode>),
    Other(Value),
}

impl From<Generation> for GenerationNode {
    fn from(generation: Generation) -> Self {
        GenerationNode::Generation(generation)
    }
}

impl<T: Into<GenerationNode>> From<Vec<T>> for GenerationNode {
    fn from(nodes: Vec<T>) -> Self {
        GenerationNode::Nested(nodes.into_iter().map(Into::into).collect())
    }
}

/// Concatenate the text of every leaf generation, depth-first and left to right.
/// Leaves that are not generations are skipped.
pub fn flatten(nodes: &[GenerationNode]) -> String {
    let mut out = String::new();
    let walked = walk::<Infallible>(nodes, &mut out, &mut |leaf| {
        warn!(leaf = %leaf, "skipping non-generation entry");
        Ok(())
    });
    match walked {
        Ok(()) => out,
        Err(never) => match never {},
    }
}

/// Like [`flatten`], but any non-generation leaf is an error.
pub fn flatten_strict(nodes: &[GenerationNode]) -> StackResult<String> {
    let mut out = String::new();
    walk::<StackError>(nodes, &mut out, &mut |leaf| {
        Err(StackError::MalformedResult(format!(
            "expected a generation, found {}",
            leaf
        )))
    })?;
    Ok(out)
}

fn walk<E>(
    nodes: &[GenerationNode],
    out: &mut String,
    on_other: &mut dyn FnMut(&Value) -> Result<(), E>,
) -> Result<(), E> {
    for node in nodes {
        match node {
            GenerationNode::Generation(g) => out.push_str(&g.text),
            GenerationNode::Nested(children) => walk(children, out, on_other)?,
            GenerationNode::Other(leaf) => on_other(leaf)?,
        }
    }
    Ok(())
}
