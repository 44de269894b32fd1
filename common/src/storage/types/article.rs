use sha2::{Digest, Sha256};
use tracing::warn;

use crate::stored_object;

/// Wire sentinel for a publication without a discoverable PDF.
pub const NO_PDF_FOUND: &str = "No PDF found";

/// Location of an auxiliary file (PDF or thumbnail) through its lifecycle.
///
/// Transitions only move forward: `Pending` resolves to `Absent` or
/// `Stored`, and a resolved location never changes again. `Absent` is a
/// completed state, not an error.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileLocation {
    Pending,
    Absent,
    Stored(String),
}

impl FileLocation {
    /// Apply a forward transition. Attempts to regress or to overwrite a
    /// resolved location are ignored and logged.
    pub fn advance(&mut self, next: FileLocation) {
        if matches!(self, FileLocation::Pending) && !matches!(next, FileLocation::Pending) {
            *self = next;
        } else {
            warn!(current = ?self, rejected = ?next, "ignoring backward file location transition");
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, FileLocation::Stored(_))
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            FileLocation::Stored(key) => Some(key.as_str()),
            _ => None,
        }
    }
}

stored_object!(Article, "article", {
    title: String,
    description: String,
    published_raw: String,
    authors: String,
    pdf_location: FileLocation,
    image_location: FileLocation
});

impl Article {
    /// Build a new article from extracted fields. The id is derived from the
    /// scraped content, so re-running ingestion over an unchanged catalog
    /// reproduces the same id, and it is never recomputed afterwards.
    pub fn new(title: String, description: String, published_raw: String, authors: String) -> Self {
        let id = Self::derive_id(&title, &published_raw, &authors);
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            title,
            description,
            published_raw,
            authors,
            pdf_location: FileLocation::Pending,
            image_location: FileLocation::Pending,
        }
    }

    /// Stable content-derived identifier: sha256 over the identifying text
    /// fields, truncated to 32 hex characters.
    pub fn derive_id(title: &str, published_raw: &str, authors: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update(b"\n");
        hasher.update(published_raw.as_bytes());
        hasher.update(b"\n");
        hasher.update(authors.as_bytes());
        let mut hex = format!("{:x}", hasher.finalize());
        hex.truncate(32);
        hex
    }

    /// The publication date in calendar form, when the scraped text is
    /// convertible. `None` stands for an unknown date.
    pub fn publication_date(&self) -> Option<chrono::NaiveDate> {
        chrono::NaiveDate::parse_from_str(self.published_raw.trim(), "%d %b %Y").ok()
    }
}

/// The JSON snapshot shape, with the wire sentinels substituted for
/// unresolved or absent file locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: String,
    pub authors: String,
    pub pdf_url: String,
    pub image_url: String,
}

impl From<&Article> for SnapshotRecord {
    fn from(article: &Article) -> Self {
        let pdf_url = match &article.pdf_location {
            FileLocation::Stored(key) => key.clone(),
            FileLocation::Pending | FileLocation::Absent => NO_PDF_FOUND.to_string(),
        };
        let image_url = match &article.image_location {
            FileLocation::Stored(key) => key.clone(),
            FileLocation::Pending | FileLocation::Absent => String::new(),
        };

        Self {
            id: article.id.clone(),
            title: article.title.clone(),
            description: article.description.clone(),
            date: article.published_raw.clone(),
            authors: article.authors.clone(),
            pdf_url,
            image_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_article() -> Article {
        Article::new(
            "Machine Learning in Asset Pricing".to_string(),
            "A survey of recent results".to_string(),
            "12 Oct 2024".to_string(),
            "J. Doe, A. Smith".to_string(),
        )
    }

    #[test]
    fn id_is_stable_across_reruns() {
        let first = sample_article();
        let second = sample_article();
        assert_eq!(first.id, second.id);
        assert_eq!(first.id.len(), 32);

        let mut different = sample_article();
        different.id = Article::derive_id("Another title", "12 Oct 2024", "J. Doe, A. Smith");
        assert_ne!(first.id, different.id);
    }

    #[test]
    fn file_location_only_moves_forward() {
        let mut location = FileLocation::Pending;
        location.advance(FileLocation::Stored("publications/pdfs/a.pdf".into()));
        assert_eq!(
            location.as_key(),
            Some("publications/pdfs/a.pdf")
        );

        // A resolved location never regresses.
        location.advance(FileLocation::Absent);
        assert!(location.is_stored());

        let mut absent = FileLocation::Pending;
        absent.advance(FileLocation::Absent);
        absent.advance(FileLocation::Stored("late".into()));
        assert_eq!(absent, FileLocation::Absent);
    }

    #[test]
    fn snapshot_substitutes_sentinels() {
        let mut article = sample_article();
        article.image_location.advance(FileLocation::Absent);

        let record = SnapshotRecord::from(&article);
        assert_eq!(record.pdf_url, NO_PDF_FOUND);
        assert_eq!(record.image_url, "");
        assert_eq!(record.date, "12 Oct 2024");

        article
            .pdf_location
            .advance(FileLocation::Stored("publications/pdfs/abc.pdf".into()));
        let record = SnapshotRecord::from(&article);
        assert_eq!(record.pdf_url, "publications/pdfs/abc.pdf");
    }

    #[test]
    fn publication_date_converts_or_is_unknown() {
        let article = sample_article();
        let date = article.publication_date().expect("convertible date");
        assert_eq!(date, chrono::NaiveDate::from_ymd_opt(2024, 10, 12).expect("valid"));

        let mut unknown = sample_article();
        unknown.published_raw = "No date".to_string();
        assert!(unknown.publication_date().is_none());
    }
}
