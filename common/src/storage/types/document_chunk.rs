use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(DocumentChunk, "document_chunk", {
    article_id: String,
    page_number: u32,
    content: String,
    embedding: Vec<f32>
});

impl DocumentChunk {
    pub fn new(article_id: String, page_number: u32, content: String, embedding: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            article_id,
            page_number,
            content,
            embedding,
        }
    }

    /// Remove every chunk belonging to one article. Running this before
    /// inserting freshly produced chunks makes re-indexing replace rather
    /// than duplicate an article's entries.
    pub async fn delete_by_article_id(
        article_id: &str,
        db_client: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db_client
            .query("DELETE document_chunk WHERE article_id = $article_id")
            .bind(("article_id", article_id.to_string()))
            .await?;

        Ok(())
    }

    /// Count the chunks stored for one article.
    pub async fn count_for_article(
        article_id: &str,
        db_client: &SurrealDbClient,
    ) -> Result<usize, AppError> {
        let chunks: Vec<DocumentChunk> = db_client
            .query("SELECT * FROM document_chunk WHERE article_id = $article_id")
            .bind(("article_id", article_id.to_string()))
            .await?
            .take(0)?;

        Ok(chunks.len())
    }
}
