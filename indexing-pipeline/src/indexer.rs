use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        store::{ArchiveStore, FetchOutcome},
        types::{article::Article, document_chunk::DocumentChunk},
    },
    utils::embedding::EmbeddingProvider,
};

use crate::{chunker::split_into_chunks, pdf_text};

/// Summary of one indexing run.
#[derive(Debug, Default)]
pub struct IndexingReport {
    pub articles_seen: usize,
    pub indexed: usize,
    pub chunks_written: usize,
    /// Articles whose PDF the archive confirmed missing.
    pub missing_pdf: usize,
    /// Articles whose indexing failed on a transient error this run.
    pub failed: usize,
}

/// Re-materializes each persisted article's PDF from the archive cache,
/// parses and chunks its text, and upserts the chunks into the vector table.
///
/// Chunks are keyed by article id and replaced wholesale, so re-running the
/// job for an already-indexed article never duplicates its entries. Articles are
/// read-only here; the job owns only the derived chunk state.
pub struct DocumentIndexer {
    db: Arc<SurrealDbClient>,
    store: ArchiveStore,
    embedding: Arc<EmbeddingProvider>,
    chunk_size_chars: usize,
}

impl DocumentIndexer {
    pub fn new(
        db: Arc<SurrealDbClient>,
        store: ArchiveStore,
        embedding: Arc<EmbeddingProvider>,
        chunk_size_chars: usize,
    ) -> Self {
        Self {
            db,
            store,
            embedding,
            chunk_size_chars,
        }
    }

    /// Index every persisted article with a stored PDF.
    ///
    /// A confirmed-missing PDF skips that article with a log line; any other
    /// storage or parsing error aborts that article's indexing but never the
    /// job.
    pub async fn run(&self) -> Result<IndexingReport, AppError> {
        let started = Instant::now();
        let articles: Vec<Article> = self.db.get_all_stored_items().await?;

        let mut report = IndexingReport {
            articles_seen: articles.len(),
            ..IndexingReport::default()
        };
        info!(articles = articles.len(), "starting indexing job");

        for article in &articles {
            let Some(key) = article.pdf_location.as_key() else {
                debug!(article_id = %article.id, "article has no stored PDF; nothing to index");
                continue;
            };

            let dest_name = format!("{}.pdf", article.id);
            let outcome = match self.store.fetch(key, Some(&dest_name)).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(article_id = %article.id, key, error = %err, "transient archive error; leaving article for a future run");
                    report.failed += 1;
                    continue;
                }
            };

            let path = match outcome {
                FetchOutcome::Hit(path) | FetchOutcome::Downloaded(path) => path,
                FetchOutcome::NotFound => {
                    warn!(article_id = %article.id, key, "PDF confirmed missing in archive; skipping article");
                    report.missing_pdf += 1;
                    continue;
                }
            };

            match self.index_document(article, &path).await {
                Ok(chunk_count) => {
                    info!(article_id = %article.id, chunks = chunk_count, "indexed article");
                    report.indexed += 1;
                    report.chunks_written += chunk_count;
                }
                Err(err) => {
                    warn!(article_id = %article.id, error = %err, "failed to index article");
                    report.failed += 1;
                }
            }
        }

        info!(
            indexed = report.indexed,
            chunks = report.chunks_written,
            missing_pdf = report.missing_pdf,
            failed = report.failed,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "indexing job finished"
        );

        Ok(report)
    }

    /// Parse one PDF into pages and replace the article's chunks.
    async fn index_document(&self, article: &Article, path: &Path) -> Result<usize, AppError> {
        let pages = pdf_text::extract_page_text(path).await?;
        self.index_pages(&article.id, &pages).await
    }

    /// Chunk, embed, and store the given page texts for an article,
    /// replacing whatever chunks it had before. Blank pages are dropped.
    pub async fn index_pages(&self, article_id: &str, pages: &[String]) -> Result<usize, AppError> {
        let mut page_chunks: Vec<(u32, String)> = Vec::new();
        for (page_index, page) in pages.iter().enumerate() {
            let trimmed = page.trim();
            if trimmed.is_empty() {
                continue;
            }
            let page_number = u32::try_from(page_index + 1).unwrap_or(u32::MAX);
            for chunk in split_into_chunks(trimmed, self.chunk_size_chars) {
                page_chunks.push((page_number, chunk));
            }
        }

        let texts: Vec<String> = page_chunks.iter().map(|(_, text)| text.clone()).collect();
        let embeddings = self.embedding.embed_batch(texts).await?;

        // Delete-then-insert keyed by article id: the replacement that makes
        // re-indexing idempotent.
        DocumentChunk::delete_by_article_id(article_id, &self.db).await?;

        for ((page_number, content), embedding) in page_chunks.into_iter().zip(embeddings) {
            let chunk = DocumentChunk::new(article_id.to_string(), page_number, content, embedding);
            self.db.store_item(chunk).await?;
        }

        DocumentChunk::count_for_article(article_id, &self.db).await
    }
}
