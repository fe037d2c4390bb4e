use std::sync::Arc;

use anyhow::{Context, Result};

use crate::index::VectorIndex;
use crate::models::{ChatTurn, RetrievedChunk};
use crate::openai::{ChatMessage, OpenAiClient};

#[derive(Clone)]
pub struct Retriever {
    client: OpenAiClient,
    index: Arc<VectorIndex>,
    chat_model: String,
    embedding_model: String,
    top_k: usize,
    source_label: String,
}

impl Retriever {
    pub fn new(
        client: OpenAiClient,
        index: Arc<VectorIndex>,
        chat_model: impl Into<String>,
        embedding_model: impl Into<String>,
        top_k: usize,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            client,
            index,
            chat_model: chat_model.into(),
            embedding_model: embedding_model.into(),
            top_k,
            source_label: source_label.into(),
        }
    }

    /// Turns a follow-up question into a standalone search query using the
    /// prior turns. Without history the question is already standalone and no
    /// model call is made.
    pub async fn rewrite_query(&self, question: &str, history: &[ChatTurn]) -> Result<String> {
        if history.is_empty() {
            return Ok(question.trim().to_string());
        }

        let messages = rewrite_messages(&self.source_label, question, history);
        let rewritten = self
            .client
            .chat(&self.chat_model, &messages, 0.0)
            .await
            .context("query rewrite failed")?;

        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            Ok(question.trim().to_string())
        } else {
            Ok(rewritten.to_string())
        }
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let embedding = self
            .client
            .embed(&self.embedding_model, query)
            .await
            .context("query embedding failed")?;

        Ok(self.index.search(&embedding, self.top_k))
    }
}

fn rewrite_messages(source_label: &str, question: &str, history: &[ChatTurn]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(format!(
        "You are a search assistant for {source_label}. Given the chat history and the \
         latest user question, produce a concise search query to find the most relevant \
         passages. If the question is already specific, return it unchanged. Reply with \
         the query text only."
    )));
    messages.extend(history.iter().map(ChatMessage::from_turn));
    messages.push(ChatMessage::user(question));
    messages
}
