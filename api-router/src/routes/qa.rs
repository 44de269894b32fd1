use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::api_state::ApiState;

#[derive(Debug, Deserialize)]
pub struct QaRequest {
    pub question: String,
}

/// Answer a question against the indexed document chunks.
pub async fn ask_question(
    State(state): State<ApiState>,
    Json(request): Json<QaRequest>,
) -> impl IntoResponse {
    let question = request.question.trim();
    if question.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "question must not be empty"})),
        );
    }

    match retrieval_pipeline::answer_question(
        question,
        state.config.retrieval_take,
        &state.db,
        &state.embedding_provider,
        &state.openai_client,
        &state.config.chat_model,
    )
    .await
    {
        Ok(answer) => (
            StatusCode::OK,
            Json(json!({
                "answer": answer.answer,
                "article_ids": answer.article_ids,
            })),
        ),
        Err(e) => {
            error!(error = %e, "failed to answer question");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "failed to answer question"})),
            )
        }
    }
}
