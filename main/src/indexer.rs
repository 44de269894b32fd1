use std::sync::Arc;

use common::{
    storage::{db::SurrealDbClient, store::ArchiveStore},
    utils::{config::get_config, embedding::EmbeddingProvider},
};
use indexing_pipeline::DocumentIndexer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Index every persisted article's PDF into the vector store.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));
    let embedding_provider = Arc::new(EmbeddingProvider::from_config(
        &config,
        Some(Arc::clone(&openai_client)),
    )?);

    db.ensure_indexes(embedding_provider.dimension()).await?;

    let storage = ArchiveStore::new(&config).await?;
    let indexer = DocumentIndexer::new(db, storage, embedding_provider, config.chunk_size_chars);

    info!("starting indexing job");
    let report = indexer.run().await?;
    info!(
        articles = report.articles_seen,
        indexed = report.indexed,
        chunks = report.chunks_written,
        missing_pdf = report.missing_pdf,
        failed = report.failed,
        "indexing job complete"
    );

    Ok(())
}
