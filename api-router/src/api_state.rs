use std::sync::Arc;

use common::{
    storage::{db::SurrealDbClient, store::ArchiveStore},
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub storage: ArchiveStore,
    pub openai_client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
    pub embedding_provider: Arc<EmbeddingProvider>,
}

impl ApiState {
    pub async fn new(
        config: &AppConfig,
        storage: ArchiveStore,
    ) -> Result<Self, Box<dyn std::error::Error>> {
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
            config,
            Some(Arc::clone(&openai_client)),
        )?);

        db.ensure_indexes(embedding_provider.dimension()).await?;

        Ok(Self {
            db,
            config: config.clone(),
            storage,
            openai_client,
            embedding_provider,
        })
    }
}
