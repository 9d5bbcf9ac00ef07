//! Retrieval-augmented answering.
//!
//! Turns a question about one document into a grounded answer with
//! citations: embed the question with the same provider used at
//! ingestion, fetch the top-K nearest records filtered to the document,
//! assemble a bounded context window, and ask the chat model to answer
//! only from that context.
//!
//! When retrieval comes back empty (document not yet ingested, or no
//! vectors survive), the canned [`NO_CONTEXT_ANSWER`] is returned without
//! calling the model at all — the model cannot be trusted to notice an
//! empty context on its own.

use sqlx::SqlitePool;

use crate::config::RetrievalConfig;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::ApiError;
use crate::history;
use crate::llm::ChatModel;
use crate::models::ScoredRecord;
use crate::vector::VectorIndex;

/// Answer returned when nothing relevant could be retrieved.
pub const NO_CONTEXT_ANSWER: &str = "I don't know.";

#[derive(Debug)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<ScoredRecord>,
}

pub async fn answer(
    pool: &SqlitePool,
    retrieval: &RetrievalConfig,
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    chat: &dyn ChatModel,
    document_id: &str,
    user_id: &str,
    question: &str,
) -> Result<Answer, ApiError> {
    let query_vector = embed_query(embedder, question)
        .await
        .map_err(|e| ApiError::upstream("embedding", e))?;

    let sources = index
        .search(&query_vector, document_id, retrieval.top_k)
        .await
        .map_err(|e| ApiError::upstream("vector-index", e))?;

    let text = if sources.is_empty() {
        NO_CONTEXT_ANSWER.to_string()
    } else {
        let context = build_context(&sources, retrieval.context_chars);
        chat.complete(&system_prompt(&context), question)
            .await
            .map_err(|e| ApiError::upstream("llm", e))?
    };

    // Best effort: a failed history write is logged but never fails the
    // answer the user is waiting on.
    if let Err(e) = history::append_exchange(pool, document_id, user_id, question, &text, &sources).await
    {
        tracing::warn!(document_id, user_id, error = %e, "failed to persist chat history");
    }

    Ok(Answer { text, sources })
}

/// Concatenate retrieved chunk texts in rank order, truncated to
/// `budget` characters. Truncation drops the lowest-ranked tail first;
/// a record that only partially fits is cut mid-text rather than
/// dropped, matching the fixed-budget contract.
pub fn build_context(records: &[ScoredRecord], budget: usize) -> String {
    let mut context = String::new();

    for record in records {
        let remaining = budget.saturating_sub(context.chars().count());
        if remaining == 0 {
            break;
        }
        if !context.is_empty() {
            if remaining < 2 {
                break;
            }
            context.push_str("\n\n");
        }
        let remaining = budget - context.chars().count();
        context.extend(record.payload.text.chars().take(remaining));
    }

    context
}

fn system_prompt(context: &str) -> String {
    format!(
        "Answer ONLY from the context below.\n\
         If the answer is not present, say \"I don't know\".\n\n\
         Context:\n{}",
        context
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordPayload;

    fn record(text: &str, score: f32) -> ScoredRecord {
        ScoredRecord {
            score,
            payload: RecordPayload {
                document_id: "doc1".to_string(),
                page: 1,
                line_start: 1,
                line_end: 1,
                text: text.to_string(),
            },
        }
    }

    #[test]
    fn context_preserves_rank_order() {
        let records = vec![record("first", 0.9), record("second", 0.5)];
        let context = build_context(&records, 2000);
        assert_eq!(context, "first\n\nsecond");
    }

    #[test]
    fn context_truncates_lowest_ranked_tail() {
        let records = vec![record(&"a".repeat(50), 0.9), record(&"b".repeat(50), 0.5)];
        let context = build_context(&records, 60);
        assert_eq!(context.chars().count(), 60);
        assert!(context.starts_with(&"a".repeat(50)));
        // The tail record is cut, the head record is intact.
        assert_eq!(context.matches('b').count(), 8);
    }

    #[test]
    fn context_with_empty_records_is_empty() {
        assert_eq!(build_context(&[], 2000), "");
    }

    #[test]
    fn prompt_embeds_context_and_grounding_instruction() {
        let prompt = system_prompt("some retrieved text");
        assert!(prompt.contains("some retrieved text"));
        assert!(prompt.contains("ONLY from the context"));
        assert!(prompt.contains("I don't know"));
    }
}
