#![allow(clippy::missing_docs_in_private_items)]

use async_openai::{
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
};
use serde_json::Value;
use tracing::instrument;

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::document_chunk::DocumentChunk},
    utils::embedding::EmbeddingProvider,
};

const ANSWER_SYSTEM_PROMPT: &str = "You are an assistant answering questions about an archive of research publications. Base your answer only on the provided document excerpts and keep it concise. If the excerpts do not contain the answer, say so.";

/// An answer assembled from retrieved excerpts, with the ids of the articles
/// the excerpts came from.
#[derive(Debug)]
pub struct Answer {
    pub answer: String,
    pub article_ids: Vec<String>,
}

/// Retrieve the chunks closest to the input text from the vector index.
#[instrument(skip_all, fields(take))]
pub async fn find_chunks_by_similarity(
    take: u8,
    input_text: &str,
    db_client: &SurrealDbClient,
    embedding_provider: &EmbeddingProvider,
) -> Result<Vec<DocumentChunk>, AppError> {
    let input_embedding = embedding_provider.embed(input_text).await?;

    let closest_query = format!(
        "SELECT *, vector::distance::knn() AS distance FROM document_chunk WHERE embedding <|{take},40|> $embedding ORDER BY distance"
    );

    let chunks: Vec<DocumentChunk> = db_client
        .query(closest_query)
        .bind(("embedding", input_embedding))
        .await?
        .take(0)?;

    Ok(chunks)
}

/// Render retrieved chunks into the context block handed to the chat model.
pub fn chunks_to_context(chunks: &[DocumentChunk]) -> Value {
    serde_json::json!(chunks
        .iter()
        .map(|chunk| {
            serde_json::json!({
                "article_id": chunk.article_id,
                "page": chunk.page_number,
                "content": chunk.content,
            })
        })
        .collect::<Vec<_>>())
}

pub fn create_user_message(context: &Value, query: &str) -> String {
    format!(
        r"
        Document excerpts:
        ==================
        {context}

        User Question:
        ==================
        {query}
        "
    )
}

pub fn create_chat_request(
    model: &str,
    user_message: String,
) -> Result<CreateChatCompletionRequest, OpenAIError> {
    CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages([
            ChatCompletionRequestSystemMessage::from(ANSWER_SYSTEM_PROMPT).into(),
            ChatCompletionRequestUserMessage::from(user_message).into(),
        ])
        .build()
}

/// Answer a question against the indexed chunks: retrieve, assemble the
/// context, and make one chat completion. The source article ids come from
/// retrieval, not from parsing the model output.
#[instrument(skip_all)]
pub async fn answer_question(
    question: &str,
    take: u8,
    db_client: &SurrealDbClient,
    embedding_provider: &EmbeddingProvider,
    openai_client: &async_openai::Client<async_openai::config::OpenAIConfig>,
    model: &str,
) -> Result<Answer, AppError> {
    let chunks = find_chunks_by_similarity(take, question, db_client, embedding_provider).await?;

    let context = chunks_to_context(&chunks);
    let request = create_chat_request(model, create_user_message(&context, question))?;
    let response = openai_client.chat().create(request).await?;

    let answer = response
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone())
        .ok_or_else(|| AppError::Processing("no content in chat completion".to_string()))?;

    let mut article_ids: Vec<String> = chunks.into_iter().map(|chunk| chunk.article_id).collect();
    article_ids.sort();
    article_ids.dedup();

    Ok(Answer {
        answer,
        article_ids,
    })
}
