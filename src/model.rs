use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::document::{Query, RetrievedDocument};
use crate::external::error::{StackError, StackResult};
use crate::external::TextGenerator;
use crate::normalize::{ChatResult, NormalizedResult};
use crate::prompt::PromptTemplate;
use crate::search::{QueryDispatcher, VectorSearch};

/// One question/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// Conversation history, owned by the caller and passed to each prediction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatHistory {
    turns: Vec<ChatTurn>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push(ChatTurn {
            question: question.into(),
            answer: answer.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// Render as ` \n Human: q\n Assistant: a` per turn.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!(" \n Human: {}\n Assistant: {}", t.question, t.answer))
            .collect()
    }
}

/// Language model wrapper answering questions directly or through retrieval.
pub struct StackModel {
    llm: Arc<dyn TextGenerator>,
    retriever: Option<QueryDispatcher<Arc<dyn VectorSearch>>>,
    chat: bool,
}

impl StackModel {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self {
            llm,
            retriever: None,
            chat: false,
        }
    }

    pub fn with_retriever(mut self, retriever: QueryDispatcher<Arc<dyn VectorSearch>>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_chat(mut self, chat: bool) -> Self {
        self.chat = chat;
        self
    }

    /// Answer a query.
    ///
    /// With a retriever the answer is the JSON text of a normalized result and the
    /// exchange is appended to `history`; without one it is the generated text.
    pub async fn predict(
        &self,
        query: impl Into<Query>,
        history: &mut ChatHistory,
    ) -> StackResult<String> {
        let question = query.into().into_text()?;

        match (&self.retriever, self.chat) {
            (Some(retriever), _) => {
                let chat = self.retrieval_qa(retriever, &question, history).await?;
                history.push(question, chat.answer.clone());
                NormalizedResult::from(chat).to_json()
            }
            (None, true) => Err(StackError::ConfigError(
                "chat mode requires a retriever".to_string(),
            )),
            (None, false) => self.plain_qa(&question).await,
        }
    }

    async fn plain_qa(&self, question: &str) -> StackResult<String> {
        let prompt = PromptTemplate::qa().format(&HashMap::from([("question", question)]))?;
        debug!("answering without retriever");
        self.llm
            .complete(&prompt)
            .await
            .map_err(StackError::BackendUnavailable)
    }

    /// Conversational retrieval: condense, retrieve, then answer over the documents.
    pub async fn retrieval_qa(
        &self,
        retriever: &QueryDispatcher<Arc<dyn VectorSearch>>,
        question: &str,
        history: &ChatHistory,
    ) -> StackResult<ChatResult> {
        let standalone = if history.is_empty() {
            question.to_string()
        } else {
            let chat_history = history.render();
            let prompt = PromptTemplate::condense_question().format(&HashMap::from([
                ("chat_history", chat_history.as_str()),
                ("question", question),
            ]))?;
            let condensed = self
                .llm
                .complete(&prompt)
                .await
                .map_err(StackError::BackendUnavailable)?;
            match condensed.trim() {
                "" => {
                    warn!("condensed question is empty, searching with the original");
                    question.to_string()
                }
                standalone => {
                    debug!(%standalone, "condensed follow-up question");
                    standalone.to_string()
                }
            }
        };

        let source_documents = retriever.search(&standalone).await?;
        info!(
            documents = source_documents.len(),
            method = %retriever.method(),
            "retrieved context"
        );

        let context = stuff_documents(&source_documents);
        let prompt = PromptTemplate::stuff_documents().format(&HashMap::from([
            ("context", context.as_str()),
            ("question", standalone.as_str()),
        ]))?;
        let answer = self
            .llm
            .complete(&prompt)
            .await
            .map_err(StackError::BackendUnavailable)?;

        Ok(ChatResult {
            answer: answer.trim().to_string(),
            source_documents,
        })
    }
}

fn stuff_documents(documents: &[RetrievedDocument]) -> String {
    documents
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_render() {
        let mut history = ChatHistory::new();
        assert_eq!(history.render(), "");

        history.push("What is Rust?", "A language.");
        history.push("Is it fast?", "Yes.");
        assert_eq!(
            history.render(),
            " \n Human: What is Rust?\n Assistant: A language. \n Human: Is it fast?\n Assistant: Yes."
        );
    }

    #[test]
    fn test_stuff_documents() {
        let docs = vec![RetrievedDocument::new("one"), RetrievedDocument::new("two")];
        assert_eq!(stuff_documents(&docs), "one\n\ntwo");
        assert_eq!(stuff_documents(&[]), "");
    }
}
