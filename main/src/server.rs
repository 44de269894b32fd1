use api_router::{api_routes_v1, api_state::ApiState};
use axum::{extract::FromRef, Router};
use common::{storage::store::ArchiveStore, utils::config::get_config};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let storage = ArchiveStore::new(&config).await?;
    let api_state = ApiState::new(&config, storage).await?;

    let app = Router::new()
        .nest("/api/v1", api_routes_v1())
        .with_state(AppState { api_state });

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Clone, FromRef)]
struct AppState {
    api_state: ApiState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use common::storage::db::SurrealDbClient;
    use common::utils::config::{AppConfig, StorageKind};
    use common::utils::embedding::EmbeddingProvider;
    use object_store::memory::InMemory;
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn smoke_startup_with_in_memory_backends() {
        let scratch = std::env::temp_dir().join(format!("archive_smoke_{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&scratch)
            .await
            .expect("temp directory");

        let config = AppConfig {
            catalog_url: "https://catalog.test/seed".into(),
            storage: StorageKind::Memory,
            ..AppConfig::default()
        };

        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("in-memory surrealdb"),
        );

        let storage = ArchiveStore::with_backend(
            Arc::new(InMemory::new()),
            StorageKind::Memory,
            scratch.clone(),
        );

        let openai_client = Arc::new(async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new()
                .with_api_key("test-key")
                .with_api_base("https://example.com"),
        ));
        let embedding_provider =
            Arc::new(EmbeddingProvider::new_hashed(384).expect("hashed provider"));

        let api_state = ApiState {
            db,
            config,
            storage,
            openai_client,
            embedding_provider,
        };

        let app = Router::new()
            .nest("/api/v1", api_routes_v1())
            .with_state(AppState { api_state });

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/live")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);

        let ready_response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/ready")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("ready response");
        assert_eq!(ready_response.status(), StatusCode::OK);

        let articles_response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/articles")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("articles response");
        assert_eq!(articles_response.status(), StatusCode::OK);

        tokio::fs::remove_dir_all(&scratch).await.ok();
    }
}
