use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use tracing::{info, warn};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        store::ArchiveStore,
        types::article::{Article, FileLocation, SnapshotRecord},
    },
    utils::config::AppConfig,
};

use crate::{
    acquire::{FileFetcher, FileKind},
    browser::CatalogBrowser,
    extractor::{ArticleExtractor, ExtractedArticle},
    navigator::PageNavigator,
};

/// Knobs for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub seed_url: String,
    pub storage_prefix: String,
    pub snapshot_path: PathBuf,
    pub result_wait: Duration,
    pub page_turn_wait: Duration,
}

impl IngestionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            seed_url: config.catalog_url.clone(),
            storage_prefix: config.storage_prefix.clone(),
            snapshot_path: PathBuf::from(&config.snapshot_path),
            result_wait: Duration::from_secs(config.result_wait_secs),
            page_turn_wait: Duration::from_secs(config.page_turn_wait_secs),
        }
    }
}

/// One skipped article or file, with enough context to find it again.
/// The report enumerates every skip; there is no silent data loss.
#[derive(Debug, Clone)]
pub struct SkippedItem {
    pub page: usize,
    pub index: usize,
    pub subject: &'static str,
    pub cause: String,
}

/// Summary of a completed ingestion run.
#[derive(Debug, Default)]
pub struct IngestionReport {
    pub pages: usize,
    pub articles: usize,
    pub skipped: Vec<SkippedItem>,
}

/// Composes navigator, extractor, acquirer, and archive store into a single
/// catalog walk.
///
/// Durability is whole-run-at-end by design: the snapshot and the rows are
/// written only after the navigator is exhausted, so a run killed mid-page
/// loses its accumulated batch. Rerunning the orchestrator is the recovery
/// path; stable article ids make that an upsert, not a duplication.
pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    store: ArchiveStore,
    browser: Arc<dyn CatalogBrowser>,
    fetcher: Arc<dyn FileFetcher>,
    config: IngestionConfig,
}

impl IngestionPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        store: ArchiveStore,
        browser: Arc<dyn CatalogBrowser>,
        fetcher: Arc<dyn FileFetcher>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            db,
            store,
            browser,
            fetcher,
            config,
        }
    }

    /// Walk every catalog page, acquire and archive each article's files,
    /// and persist the accumulated batch.
    pub async fn run(&self) -> Result<IngestionReport, AppError> {
        let started = Instant::now();
        let mut navigator = PageNavigator::new(
            Arc::clone(&self.browser),
            self.config.seed_url.clone(),
            self.config.result_wait,
            self.config.page_turn_wait,
        );
        let extractor = ArticleExtractor::new(Arc::clone(&self.browser));

        let mut report = IngestionReport::default();
        let mut batch: Vec<Article> = Vec::new();

        while let Some(page) = navigator.next_page()? {
            info!(page = page.number, results = page.result_count, "processing result page");

            for index in 0..page.result_count {
                match extractor.extract(index) {
                    Ok(extracted) => {
                        let article = self
                            .settle_files(extracted, page.number, index, &mut report)
                            .await;
                        batch.push(article);
                    }
                    Err(err) => {
                        warn!(page = page.number, index, error = %err, "skipping result");
                        report.skipped.push(SkippedItem {
                            page: page.number,
                            index,
                            subject: "article",
                            cause: err.to_string(),
                        });
                    }
                }
            }

            report.pages += 1;
        }

        report.articles = batch.len();
        self.persist_batch(&batch).await?;

        info!(
            pages = report.pages,
            articles = report.articles,
            skipped = report.skipped.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "ingestion run finished"
        );

        Ok(report)
    }

    /// Acquire and archive both files for one extracted article, advancing
    /// its locations. Transfer failures leave the absent-file sentinel and a
    /// skip record; they never fail the article.
    async fn settle_files(
        &self,
        extracted: ExtractedArticle,
        page: usize,
        index: usize,
        report: &mut IngestionReport,
    ) -> Article {
        let mut article = extracted.article;

        match extracted.pdf_url {
            Some(url) => match self.transfer(&url, FileKind::Pdf, &article.id).await {
                Some(key) => article.pdf_location.advance(FileLocation::Stored(key)),
                None => {
                    article.pdf_location.advance(FileLocation::Absent);
                    report.skipped.push(SkippedItem {
                        page,
                        index,
                        subject: "pdf",
                        cause: format!("transfer failed for {url}"),
                    });
                }
            },
            None => article.pdf_location.advance(FileLocation::Absent),
        }

        match extracted.image_url {
            Some(url) => match self.transfer(&url, FileKind::Image, &article.id).await {
                Some(key) => article.image_location.advance(FileLocation::Stored(key)),
                None => {
                    article.image_location.advance(FileLocation::Absent);
                    report.skipped.push(SkippedItem {
                        page,
                        index,
                        subject: "image",
                        cause: format!("transfer failed for {url}"),
                    });
                }
            },
            None => article.image_location.advance(FileLocation::Absent),
        }

        article
    }

    /// Download one resource and upload it under the article's namespaced
    /// key. Either half failing yields `None`; both halves log their cause.
    async fn transfer(&self, url: &str, kind: FileKind, article_id: &str) -> Option<String> {
        let local = self.fetcher.download(url, kind).await?;

        let extension = local
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or_else(|| kind.default_extension().to_string(), str::to_ascii_lowercase);
        let key = format!(
            "{}/{}/{}.{}",
            self.config.storage_prefix,
            kind.dir_name(),
            article_id,
            extension
        );

        self.store.upload_file(&local, &key).await
    }

    /// Persist the completed batch: one atomic JSON snapshot plus one row
    /// per article, upserted under its stable id.
    async fn persist_batch(&self, batch: &[Article]) -> Result<(), AppError> {
        self.write_snapshot(batch).await?;

        for article in batch {
            self.db.upsert_item(article.clone()).await?;
        }

        info!(
            articles = batch.len(),
            snapshot = %self.config.snapshot_path.display(),
            "persisted ingestion batch"
        );
        Ok(())
    }

    /// Write the snapshot through a temp file in the destination directory,
    /// renamed into place so readers never observe a partial file.
    async fn write_snapshot(&self, batch: &[Article]) -> Result<(), AppError> {
        let records: Vec<SnapshotRecord> = batch.iter().map(SnapshotRecord::from).collect();
        let json = serde_json::to_vec_pretty(&records)
            .map_err(|err| AppError::Processing(format!("failed to encode snapshot: {err}")))?;

        let path = &self.config.snapshot_path;
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent).await?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|err| AppError::Io(err.error))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::file_name_from_url;
    use crate::browser::testing::ScriptedBrowser;
    use crate::browser::RawResult;
    use async_trait::async_trait;
    use common::storage::types::article::NO_PDF_FOUND;
    use common::utils::config::StorageKind;
    use object_store::memory::InMemory;
    use uuid::Uuid;

    /// Writes canned bytes instead of touching the network. URLs containing
    /// "unfetchable" fail, exercising the transfer-failure path.
    struct StubFetcher {
        dir: PathBuf,
    }

    #[async_trait]
    impl FileFetcher for StubFetcher {
        async fn download(&self, url: &str, kind: FileKind) -> Option<PathBuf> {
            if url.contains("unfetchable") {
                return None;
            }

            let name = file_name_from_url(url).ok()?;
            let dir = self.dir.join(kind.dir_name());
            tokio::fs::create_dir_all(&dir).await.ok()?;
            let dest = dir.join(name);
            let body = match kind {
                FileKind::Pdf => b"%PDF-1.4 stub".as_slice(),
                FileKind::Image => b"stub-image-bytes".as_slice(),
            };
            tokio::fs::write(&dest, body).await.ok()?;
            Some(dest)
        }
    }

    fn full_result(slug: &str) -> RawResult {
        RawResult {
            title: Some(format!("Title {slug}")),
            description: Some(format!("Description {slug}")),
            date: Some("12 Oct 2024".to_string()),
            authors: Some("J. Doe".to_string()),
            detail_url: Some(format!("https://catalog.test/articles/{slug}")),
            image_url: Some(format!("https://cdn.test/thumbs/{slug}.jpg")),
        }
    }

    struct Harness {
        pipeline: IngestionPipeline,
        db: Arc<SurrealDbClient>,
        store: ArchiveStore,
        _scratch: tempfile::TempDir,
    }

    async fn harness(browser: ScriptedBrowser) -> Harness {
        let scratch = tempfile::tempdir().expect("scratch dir");
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("in-memory surrealdb"),
        );
        let store = ArchiveStore::with_backend(
            Arc::new(InMemory::new()),
            StorageKind::Memory,
            scratch.path().join("cache"),
        );
        tokio::fs::create_dir_all(store.cache_dir())
            .await
            .expect("cache dir");

        let config = IngestionConfig {
            seed_url: "https://catalog.test/seed".to_string(),
            storage_prefix: "publications".to_string(),
            snapshot_path: scratch.path().join("articles_data.json"),
            result_wait: Duration::from_millis(10),
            page_turn_wait: Duration::from_millis(10),
        };

        let pipeline = IngestionPipeline::new(
            Arc::clone(&db),
            store.clone(),
            Arc::new(browser),
            Arc::new(StubFetcher {
                dir: scratch.path().join("downloads"),
            }),
            config,
        );

        Harness {
            pipeline,
            db,
            store,
            _scratch: scratch,
        }
    }

    async fn read_snapshot(harness: &Harness) -> Vec<SnapshotRecord> {
        let bytes = tokio::fs::read(&harness.pipeline.config.snapshot_path)
            .await
            .expect("snapshot written");
        serde_json::from_slice(&bytes).expect("snapshot parses")
    }

    #[tokio::test]
    async fn two_page_catalog_end_to_end() {
        // Two pages of 3 and 2 results. One page-1 entry has no thumbnail;
        // one page-2 entry's detail scan finds no PDF link.
        let mut imageless = full_result("imageless");
        imageless.image_url = None;

        let pdfless = full_result("pdfless");
        let pdfless_detail = pdfless.detail_url.clone().expect("detail url");

        let mut browser = ScriptedBrowser::new(vec![
            vec![full_result("one"), imageless, full_result("three")],
            vec![pdfless, full_result("five")],
        ]);
        browser.pdfless_details.insert(pdfless_detail);

        let harness = harness(browser).await;
        let report = harness.pipeline.run().await.expect("run succeeds");

        assert_eq!(report.pages, 2);
        assert_eq!(report.articles, 5);
        assert!(report.skipped.is_empty(), "no skips expected: {:?}", report.skipped);

        let rows: Vec<Article> = harness
            .db
            .get_all_stored_items()
            .await
            .expect("rows readable");
        assert_eq!(rows.len(), 5);

        let records = read_snapshot(&harness).await;
        assert_eq!(records.len(), 5);

        let resolved_images = records
            .iter()
            .filter(|r| r.image_url.starts_with("publications/images/"))
            .count();
        assert_eq!(resolved_images, 4);
        assert_eq!(
            records.iter().filter(|r| r.image_url.is_empty()).count(),
            1
        );

        let resolved_pdfs = records
            .iter()
            .filter(|r| r.pdf_url.starts_with("publications/pdfs/"))
            .count();
        assert_eq!(resolved_pdfs, 4);
        assert_eq!(
            records.iter().filter(|r| r.pdf_url == NO_PDF_FOUND).count(),
            1
        );

        // Uploaded objects really landed in the archive.
        for record in records.iter().filter(|r| r.pdf_url != NO_PDF_FOUND) {
            assert!(harness
                .store
                .exists(&record.pdf_url)
                .await
                .expect("exists check"));
        }
    }

    #[tokio::test]
    async fn broken_result_is_skipped_and_logged_not_fatal() {
        let mut browser = ScriptedBrowser::new(vec![vec![
            full_result("ok-a"),
            full_result("detached"),
            full_result("ok-b"),
        ]]);
        browser.broken_results.insert((0, 1));

        let harness = harness(browser).await;
        let report = harness.pipeline.run().await.expect("run succeeds");

        assert_eq!(report.articles, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].subject, "article");
        assert_eq!(report.skipped[0].index, 1);

        let records = read_snapshot(&harness).await;
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn failed_pdf_transfer_keeps_sentinel_and_reports_skip() {
        // The detail page resolves to a PDF URL the fetcher cannot retrieve;
        // the thumbnail URL stays fetchable.
        let mut result = full_result("unfetchable-doc");
        result.image_url = Some("https://cdn.test/thumbs/cover.jpg".to_string());
        let browser = ScriptedBrowser::new(vec![vec![result]]);

        let harness = harness(browser).await;
        let report = harness.pipeline.run().await.expect("run succeeds");

        assert_eq!(report.articles, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].subject, "pdf");

        let records = read_snapshot(&harness).await;
        assert_eq!(records[0].pdf_url, NO_PDF_FOUND);
        // The thumbnail still made it.
        assert!(records[0].image_url.starts_with("publications/images/"));
    }

    #[tokio::test]
    async fn rerun_upserts_rather_than_duplicating_rows() {
        let pages = vec![vec![full_result("stable")]];
        let browser = ScriptedBrowser::new(pages.clone());
        let harness = harness(browser).await;
        harness.pipeline.run().await.expect("first run");

        // Second pipeline over the same scripted catalog, same database.
        let scratch = tempfile::tempdir().expect("scratch dir");
        let second = IngestionPipeline::new(
            Arc::clone(&harness.db),
            harness.store.clone(),
            Arc::new(ScriptedBrowser::new(pages)),
            Arc::new(StubFetcher {
                dir: scratch.path().join("downloads"),
            }),
            harness.pipeline.config.clone(),
        );
        second.run().await.expect("second run");

        let rows: Vec<Article> = harness
            .db
            .get_all_stored_items()
            .await
            .expect("rows readable");
        assert_eq!(rows.len(), 1, "stable ids must upsert, not duplicate");
    }
}
