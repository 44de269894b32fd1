use std::sync::Arc;

use tracing::warn;

use common::storage::types::article::Article;

use crate::browser::{BrowserError, CatalogBrowser};

/// Field sentinels substituted when a sub-element is absent. These are data
/// values, never errors, and they flow into the persisted record unchanged.
pub const NO_TITLE: &str = "No title";
pub const NO_DESCRIPTION: &str = "No description";
pub const NO_DATE: &str = "No date";
pub const NO_AUTHORS: &str = "No authors";

/// An article fresh out of extraction, with the source URLs for its files
/// still to be acquired. `pdf_url: None` means the detail-page scan found no
/// PDF; `image_url: None` means the entry carries no thumbnail.
#[derive(Debug, Clone)]
pub struct ExtractedArticle {
    pub article: Article,
    pub pdf_url: Option<String>,
    pub image_url: Option<String>,
}

/// Reads one catalog entry at a time, always re-resolving the live result
/// list by index through the browser seam. Handles are never retained across
/// reads, so a re-render between entries cannot poison the extraction.
pub struct ArticleExtractor {
    browser: Arc<dyn CatalogBrowser>,
}

impl ArticleExtractor {
    pub fn new(browser: Arc<dyn CatalogBrowser>) -> Self {
        Self { browser }
    }

    /// Extract the entry at `index` of the current result page.
    ///
    /// Missing sub-elements degrade to sentinels; only a detached or
    /// unreadable entry (after re-acquire) is an error, which the caller
    /// logs and skips without ending the page loop.
    pub fn extract(&self, index: usize) -> Result<ExtractedArticle, BrowserError> {
        let raw = self.browser.read_result(index)?;

        let title = raw.title.unwrap_or_else(|| NO_TITLE.to_string());
        let description = raw
            .description
            .unwrap_or_else(|| NO_DESCRIPTION.to_string());
        let date = raw.date.unwrap_or_else(|| NO_DATE.to_string());
        let authors = raw.authors.unwrap_or_else(|| NO_AUTHORS.to_string());

        let article = Article::new(title, description, date, authors);

        // Resolving the PDF opens a separate browsing context; any failure
        // there degrades to "no PDF" rather than failing the article.
        let pdf_url = match raw.detail_url {
            Some(detail_url) => match self.browser.find_pdf_link(&detail_url) {
                Ok(link) => link,
                Err(err) => {
                    warn!(index, detail_url, error = %err, "pdf link scan failed");
                    None
                }
            },
            None => None,
        };

        Ok(ExtractedArticle {
            article,
            pdf_url,
            image_url: raw.image_url,
        })
    }
}
