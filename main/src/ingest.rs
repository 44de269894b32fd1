use std::sync::Arc;

use common::{
    storage::{db::SurrealDbClient, store::ArchiveStore},
    utils::config::get_config,
};
use ingestion_pipeline::{
    acquire::FileAcquirer,
    browser::ChromeCatalogBrowser,
    pipeline::{IngestionConfig, IngestionPipeline},
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Run one full ingestion pass over the configured catalog.
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

    let storage = ArchiveStore::new(&config).await?;
    let browser = Arc::new(ChromeCatalogBrowser::new()?);
    let fetcher = Arc::new(FileAcquirer::new(&config.download_dir));

    let pipeline = IngestionPipeline::new(
        db,
        storage,
        browser,
        fetcher,
        IngestionConfig::from_app_config(&config),
    );

    info!(catalog = %config.catalog_url, "starting ingestion run");
    let report = pipeline.run().await?;

    info!(
        pages = report.pages,
        articles = report.articles,
        skipped = report.skipped.len(),
        "ingestion run complete"
    );
    for skip in &report.skipped {
        warn!(
            page = skip.page,
            index = skip.index,
            subject = skip.subject,
            cause = %skip.cause,
            "skipped during run"
        );
    }

    Ok(())
}
