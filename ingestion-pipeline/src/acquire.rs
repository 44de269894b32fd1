use std::path::PathBuf;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use common::error::AppError;

/// Destination category for an acquired file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Image,
}

impl FileKind {
    /// Directory (and remote key) segment for this category.
    pub fn dir_name(self) -> &'static str {
        match self {
            FileKind::Pdf => "pdfs",
            FileKind::Image => "images",
        }
    }

    /// Extension used when the source URL does not carry one.
    pub fn default_extension(self) -> &'static str {
        match self {
            FileKind::Pdf => "pdf",
            FileKind::Image => "jpg",
        }
    }
}

/// Downloads remote resources into the local staging area.
///
/// Failures never escape this boundary: any network or filesystem error
/// resolves to `None` with a log line, and the owning article keeps its
/// absent-file sentinel.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn download(&self, url: &str, kind: FileKind) -> Option<PathBuf>;
}

/// `FileFetcher` over plain HTTP, streaming bodies chunk by chunk so large
/// PDFs never sit in memory whole.
pub struct FileAcquirer {
    http: reqwest::Client,
    download_dir: PathBuf,
}

impl FileAcquirer {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            http: reqwest::Client::new(),
            download_dir: download_dir.into(),
        }
    }

    async fn try_download(&self, url: &str, kind: FileKind) -> Result<PathBuf, AppError> {
        let file_name = file_name_from_url(url)?;
        let dir = self.download_dir.join(kind.dir_name());
        tokio::fs::create_dir_all(&dir).await?;

        // Deterministic per-URL naming: a rerun overwrites the previous copy.
        let dest = dir.join(file_name);

        let response = self.http.get(url).send().await?.error_for_status()?;
        let mut stream = response.bytes_stream();
        let mut file = tokio::fs::File::create(&dest).await?;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!(url, path = %dest.display(), "downloaded resource");
        Ok(dest)
    }
}

#[async_trait]
impl FileFetcher for FileAcquirer {
    async fn download(&self, url: &str, kind: FileKind) -> Option<PathBuf> {
        match self.try_download(url, kind).await {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(url, kind = kind.dir_name(), error = %err, "download failed");
                None
            }
        }
    }
}

/// Local file name for a resource URL: the final path segment with any query
/// parameters stripped. Collisions across runs overwrite, which is accepted.
pub fn file_name_from_url(url: &str) -> Result<String, AppError> {
    let parsed = Url::parse(url)
        .map_err(|err| AppError::Validation(format!("invalid resource URL {url}: {err}")))?;

    let name = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(ToString::to_string)
        .ok_or_else(|| AppError::Validation(format!("resource URL has no file name: {url}")))?;

    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_strips_query_parameters() {
        let name = file_name_from_url("https://cdn.test/docs/report.pdf?version=3&sig=abc")
            .expect("valid url");
        assert_eq!(name, "report.pdf");
    }

    #[test]
    fn file_name_takes_last_segment() {
        let name =
            file_name_from_url("https://cdn.test/a/b/c/cover.jpg").expect("valid url");
        assert_eq!(name, "cover.jpg");
    }

    #[test]
    fn urls_without_a_path_are_rejected() {
        assert!(file_name_from_url("https://cdn.test").is_err());
        assert!(file_name_from_url("not a url").is_err());
    }

    #[tokio::test]
    async fn download_failure_yields_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let acquirer = FileAcquirer::new(dir.path());

        // Nothing is listening on this port; the error must not escape.
        let result = acquirer
            .download("http://127.0.0.1:9/unreachable.pdf", FileKind::Pdf)
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn invalid_url_yields_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let acquirer = FileAcquirer::new(dir.path());

        let result = acquirer.download("::nonsense::", FileKind::Image).await;
        assert!(result.is_none());
    }
}
