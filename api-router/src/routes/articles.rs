use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::error;

use common::storage::types::article::{Article, SnapshotRecord};

use crate::api_state::ApiState;

/// List every ingested article in the public snapshot shape.
pub async fn list_articles(State(state): State<ApiState>) -> impl IntoResponse {
    match state.db.get_all_stored_items::<Article>().await {
        Ok(articles) => {
            let records: Vec<SnapshotRecord> =
                articles.iter().map(SnapshotRecord::from).collect();
            (StatusCode::OK, Json(json!(records)))
        }
        Err(e) => {
            error!(error = %e, "failed to list articles");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "failed to list articles"})),
            )
        }
    }
}
