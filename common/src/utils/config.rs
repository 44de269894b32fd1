use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
    S3,
}

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    OpenAI,
    Hashed,
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    /// Seed catalog URL, including whatever sort/page-size query parameters
    /// the operator wants. Consumed opaquely.
    pub catalog_url: String,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: EmbeddingBackend,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_download_dir")]
    pub download_dir: String,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
    #[serde(default = "default_storage_prefix")]
    pub storage_prefix: String,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default)]
    pub s3_bucket: Option<String>,
    #[serde(default = "default_result_wait_secs")]
    pub result_wait_secs: u64,
    #[serde(default = "default_page_turn_wait_secs")]
    pub page_turn_wait_secs: u64,
    #[serde(default = "default_chunk_size_chars")]
    pub chunk_size_chars: usize,
    #[serde(default = "default_retrieval_take")]
    pub retrieval_take: u8,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimensions() -> u32 {
    1536
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::OpenAI
}

fn default_http_port() -> u16 {
    3000
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_cache_dir() -> String {
    "./data/cache".to_string()
}

fn default_download_dir() -> String {
    "./data/scraped".to_string()
}

fn default_snapshot_path() -> String {
    "./data/articles_data.json".to_string()
}

fn default_storage_prefix() -> String {
    "publications".to_string()
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

fn default_result_wait_secs() -> u64 {
    10
}

fn default_page_turn_wait_secs() -> u64 {
    10
}

fn default_chunk_size_chars() -> usize {
    1500
}

fn default_retrieval_take() -> u8 {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog_url: String::new(),
            surrealdb_address: String::new(),
            surrealdb_username: String::new(),
            surrealdb_password: String::new(),
            surrealdb_namespace: String::new(),
            surrealdb_database: String::new(),
            openai_api_key: String::new(),
            openai_base_url: default_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            embedding_backend: default_embedding_backend(),
            http_port: default_http_port(),
            data_dir: default_data_dir(),
            cache_dir: default_cache_dir(),
            download_dir: default_download_dir(),
            snapshot_path: default_snapshot_path(),
            storage_prefix: default_storage_prefix(),
            storage: default_storage_kind(),
            s3_bucket: None,
            result_wait_secs: default_result_wait_secs(),
            page_turn_wait_secs: default_page_turn_wait_secs(),
            chunk_size_chars: default_chunk_size_chars(),
            retrieval_take: default_retrieval_take(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_paths() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.storage, StorageKind::Local);
        assert_eq!(cfg.storage_prefix, "publications");
        assert!(cfg.snapshot_path.ends_with("articles_data.json"));
        assert_eq!(cfg.result_wait_secs, 10);
    }
}
