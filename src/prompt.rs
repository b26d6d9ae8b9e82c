use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;

use crate::external::error::{StackError, StackResult};

pub const QA_TEMPLATE: &str = "Question: {question}\n\nAnswer: ";

pub const CONDENSE_QUESTION_TEMPLATE: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question, in its original language.\n\n\
Chat History:\n{chat_history}\n\
Follow Up Input: {question}\n\
Standalone question:";

pub const STUFF_DOCUMENTS_TEMPLATE: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\n\
{context}\n\n\
Question: {question}\n\
Helpful Answer:";

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern is valid"))
}

/// A text template with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
    input_variables: Vec<String>,
}

impl PromptTemplate {
    /// Build a template, checking that its placeholders are exactly `input_variables`.
    pub fn new(template: impl Into<String>, input_variables: &[&str]) -> StackResult<Self> {
        let template = template.into();
        let found: BTreeSet<&str> = placeholder_re()
            .captures_iter(&template)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        let declared: BTreeSet<&str> = input_variables.iter().copied().collect();

        if found != declared {
            return Err(StackError::ConfigError(format!(
                "template placeholders {:?} do not match input variables {:?}",
                found, declared
            )));
        }

        Ok(Self {
            input_variables: input_variables.iter().map(|v| v.to_string()).collect(),
            template,
        })
    }

    pub fn qa() -> Self {
        Self::builtin(QA_TEMPLATE, &["question"])
    }

    pub fn condense_question() -> Self {
        Self::builtin(CONDENSE_QUESTION_TEMPLATE, &["chat_history", "question"])
    }

    pub fn stuff_documents() -> Self {
        Self::builtin(STUFF_DOCUMENTS_TEMPLATE, &["context", "question"])
    }

    fn builtin(template: &str, input_variables: &[&str]) -> Self {
        Self {
            template: template.to_string(),
            input_variables: input_variables.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    /// Substitute every placeholder. Missing variables are an error.
    pub fn format(&self, values: &HashMap<&str, &str>) -> StackResult<String> {
        if let Some(missing) = self
            .input_variables
            .iter()
            .find(|v| !values.contains_key(v.as_str()))
        {
            return Err(StackError::ConfigError(format!(
                "missing prompt variable: {}",
                missing
            )));
        }

        Ok(placeholder_re()
            .replace_all(&self.template, |caps: &regex::Captures| {
                values.get(&caps[1]).copied().unwrap_or_default().to_string()
            })
            .into_owned())
    }
}
