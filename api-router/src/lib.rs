#![allow(clippy::missing_docs_in_private_items)]

use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};

use api_state::ApiState;
use routes::{articles::list_articles, liveness::live, qa::ask_question, readiness::ready};

pub mod api_state;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    Router::new()
        .route("/live", get(live))
        .route("/ready", get(ready))
        .route("/articles", get(list_articles))
        .route("/qa", post(ask_question))
}
