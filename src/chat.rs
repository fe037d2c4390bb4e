use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::timeout;

use crate::models::{ChatResponse, ChatTurn, RetrievedChunk, SourceRef};
use crate::openai::{ChatMessage, OpenAiClient};
use crate::retrieval::Retriever;

const NOT_COVERED_MESSAGE: &str = "The HR policy does not address this question.";
const PREVIEW_CHARS: usize = 220;

#[derive(Clone)]
pub struct ChatService {
    client: OpenAiClient,
    retriever: Retriever,
    chat_model: String,
    source_label: String,
    stage_timeout: Duration,
}

impl ChatService {
    pub fn new(
        client: OpenAiClient,
        retriever: Retriever,
        chat_model: impl Into<String>,
        source_label: impl Into<String>,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            client,
            retriever,
            chat_model: chat_model.into(),
            source_label: source_label.into(),
            stage_timeout,
        }
    }

    /// Runs the full pipeline for one question: rewrite, retrieve, then
    /// generate a grounded answer. Each stage runs under its own timeout so a
    /// hung remote call fails the request instead of blocking it forever.
    pub async fn answer(&self, question: &str, history: &[ChatTurn]) -> Result<ChatResponse> {
        let query = timeout(
            self.stage_timeout,
            self.retriever.rewrite_query(question, history),
        )
        .await
        .context("query rewrite timed out")??;

        let retrieved = timeout(self.stage_timeout, self.retriever.retrieve(&query))
            .await
            .context("retrieval timed out")??;

        if retrieved.is_empty() {
            return Ok(ChatResponse {
                answer: NOT_COVERED_MESSAGE.to_string(),
                sources: vec![],
            });
        }

        let context = build_context(&retrieved);
        let messages = answer_messages(&self.source_label, question, &context, history);
        let answer = timeout(
            self.stage_timeout,
            self.client.chat(&self.chat_model, &messages, 0.0),
        )
        .await
        .context("answer generation timed out")??;

        Ok(ChatResponse {
            answer,
            sources: sources_from_chunks(&retrieved),
        })
    }
}

fn build_context(retrieved: &[RetrievedChunk]) -> String {
    let mut context = String::new();
    for item in retrieved {
        let page = item
            .chunk
            .page
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        context.push_str(&format!(
            "[{} | page {}]\n{}\n\n",
            item.chunk.source, page, item.chunk.content
        ));
    }
    context
}

fn answer_messages(
    source_label: &str,
    question: &str,
    context: &str,
    history: &[ChatTurn],
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(format!(
        "You are an HR assistant answering ONLY from the provided context. The context \
         consists of excerpts from {source_label}.\n\
         Requirements:\n\
         1) If the answer is not in the context, say you cannot find it in the policy.\n\
         2) Quote exact policy language sparingly when helpful.\n\
         3) Always include a short 'Sources' section with page numbers.\n\
         4) Keep answers clear, concise, and compliant."
    )));
    messages.extend(history.iter().map(ChatMessage::from_turn));
    messages.push(ChatMessage::user(format!(
        "Question: {question}\n\nContext:\n{context}\nProvide the best possible answer now."
    )));
    messages
}

fn sources_from_chunks(retrieved: &[RetrievedChunk]) -> Vec<SourceRef> {
    retrieved
        .iter()
        .map(|item| SourceRef {
            page: item.chunk.page,
            source: item.chunk.source.clone(),
            preview: preview(&item.chunk.content),
        })
        .collect()
}

fn preview(content: &str) -> String {
    content
        .chars()
        .take(PREVIEW_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Role};

    fn retrieved(id: &str, content: &str, page: Option<i64>, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                id: id.to_string(),
                content: content.to_string(),
                page,
                source: "Nestlé HR Policy (2012)".to_string(),
                chunk_index: 0,
            },
            score,
        }
    }

    #[test]
    fn context_lists_every_chunk_with_its_page() {
        let chunks = vec![
            retrieved("a", "Vacation accrues at two days per month.", Some(4), 0.9),
            retrieved("b", "Sick leave requires a doctor's note.", None, 0.7),
        ];

        let context = build_context(&chunks);
        assert!(context.contains("page 4"));
        assert!(context.contains("page -"));
        assert!(context.contains("Vacation accrues"));
        assert!(context.contains("doctor's note"));
    }

    #[test]
    fn system_prompt_demands_grounding_and_sources() {
        let messages = answer_messages("Nestlé HR Policy (2012)", "q", "ctx", &[]);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("cannot find it in the policy"));
        assert!(messages[0].content.contains("'Sources' section"));
    }

    #[test]
    fn question_and_context_land_in_the_final_user_message() {
        let history = vec![ChatTurn {
            role: Role::User,
            content: "earlier question".to_string(),
        }];
        let messages = answer_messages(
            "Nestlé HR Policy (2012)",
            "What is the vacation policy?",
            "[ctx excerpt]",
            &history,
        );

        assert_eq!(messages.len(), 3);
        let last = messages.last().expect("final message");
        assert_eq!(last.role, "user");
        assert!(last.content.contains("What is the vacation policy?"));
        assert!(last.content.contains("[ctx excerpt]"));
    }

    #[test]
    fn sources_preserve_page_and_order() {
        let chunks = vec![
            retrieved("a", "First chunk.", Some(4), 0.9),
            retrieved("b", "Second chunk.", Some(7), 0.8),
        ];

        let sources = sources_from_chunks(&chunks);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].page, Some(4));
        assert_eq!(sources[1].page, Some(7));
        assert_eq!(sources[0].preview, "First chunk.");
    }

    #[test]
    fn previews_are_truncated() {
        let long = "x".repeat(1000);
        let chunks = vec![retrieved("a", &long, Some(1), 0.5)];
        let sources = sources_from_chunks(&chunks);
        assert_eq!(sources[0].preview.chars().count(), PREVIEW_CHARS);
    }
}
