use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path as ObjPath, ObjectStore};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::utils::config::{AppConfig, StorageKind};

pub type DynStore = Arc<dyn ObjectStore>;

/// Outcome of a cache-aware fetch from the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Served from the local cache without touching the remote store.
    Hit(PathBuf),
    /// Downloaded from the remote store into the cache.
    Downloaded(PathBuf),
    /// The remote store confirmed the key does not exist.
    NotFound,
}

impl FetchOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            FetchOutcome::Hit(path) | FetchOutcome::Downloaded(path) => Some(path),
            FetchOutcome::NotFound => None,
        }
    }
}

/// Gateway to the object store holding publication PDFs and images.
///
/// Downloads go through a local cache directory addressed by the remote key
/// (or an explicit destination name). Cache entries are never invalidated;
/// repeated fetches within and across runs are served locally.
#[derive(Clone)]
pub struct ArchiveStore {
    store: DynStore,
    backend_kind: StorageKind,
    cache_dir: PathBuf,
}

impl ArchiveStore {
    pub async fn new(cfg: &AppConfig) -> Result<Self, AppError> {
        let store = create_storage_backend(cfg).await?;
        let cache_dir = PathBuf::from(&cfg.cache_dir);
        tokio::fs::create_dir_all(&cache_dir).await?;

        Ok(Self {
            store,
            backend_kind: cfg.storage.clone(),
            cache_dir,
        })
    }

    /// Build a gateway over an explicit backend. Used by tests to inject an
    /// in-memory store with a scratch cache directory.
    pub fn with_backend(store: DynStore, backend_kind: StorageKind, cache_dir: PathBuf) -> Self {
        Self {
            store,
            backend_kind,
            cache_dir,
        }
    }

    pub fn backend_kind(&self) -> &StorageKind {
        &self.backend_kind
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Store bytes at the specified location. Overwrites any existing object.
    pub async fn put(&self, location: &str, data: Bytes) -> object_store::Result<()> {
        let path = ObjPath::from(location);
        let payload = object_store::PutPayload::from_bytes(data);
        self.store.put(&path, payload).await.map(|_| ())
    }

    /// Retrieve bytes from the specified location, buffered in memory.
    pub async fn get(&self, location: &str) -> object_store::Result<Bytes> {
        let path = ObjPath::from(location);
        let result = self.store.get(&path).await?;
        result.bytes().await
    }

    /// Get a streaming handle for large objects.
    pub async fn get_stream(
        &self,
        location: &str,
    ) -> object_store::Result<BoxStream<'static, object_store::Result<Bytes>>> {
        let path = ObjPath::from(location);
        let result = self.store.get(&path).await?;
        Ok(result.into_stream())
    }

    /// Check if an object exists at the specified location.
    pub async fn exists(&self, location: &str) -> object_store::Result<bool> {
        let path = ObjPath::from(location);
        self.store
            .head(&path)
            .await
            .map(|_| true)
            .or_else(|e| match e {
                object_store::Error::NotFound { .. } => Ok(false),
                _ => Err(e),
            })
    }

    /// List all objects below the specified prefix.
    pub async fn list(
        &self,
        prefix: Option<&str>,
    ) -> object_store::Result<Vec<object_store::ObjectMeta>> {
        let prefix_path = prefix.map(ObjPath::from);
        self.store.list(prefix_path.as_ref()).try_collect().await
    }

    /// Upload a local file under the given key.
    ///
    /// Uploading the same key twice overwrites the previous object. Every
    /// failure mode resolves to `None` with its own log line: a missing
    /// local file, any other read error, and backend errors are reported
    /// separately so the run log identifies what was lost.
    pub async fn upload_file(&self, local_path: &Path, key: &str) -> Option<String> {
        let data = match tokio::fs::read(local_path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                error!(path = %local_path.display(), key, "upload skipped: local file not found");
                return None;
            }
            Err(err) => {
                error!(path = %local_path.display(), key, error = %err, "upload skipped: failed to read local file");
                return None;
            }
        };

        match self.put(key, Bytes::from(data)).await {
            Ok(()) => {
                debug!(key, "uploaded object");
                Some(key.to_string())
            }
            Err(err) => {
                error!(key, error = %err, "upload skipped: object store rejected put");
                None
            }
        }
    }

    /// Fetch an object through the local cache.
    ///
    /// The cache path derives from the key's final segment, or from
    /// `dest_name` when supplied. On a cache miss the remote store is probed
    /// first: a confirmed missing key yields `FetchOutcome::NotFound`, while
    /// transient errors propagate so callers can distinguish "genuinely no
    /// file" from "try again".
    pub async fn fetch(
        &self,
        key: &str,
        dest_name: Option<&str>,
    ) -> Result<FetchOutcome, AppError> {
        let local_path = self.cache_path(key, dest_name);

        if tokio::fs::try_exists(&local_path).await? {
            debug!(key, path = %local_path.display(), "cache hit");
            return Ok(FetchOutcome::Hit(local_path));
        }

        match self.store.head(&ObjPath::from(key)).await {
            Ok(_) => {}
            Err(object_store::Error::NotFound { .. }) => {
                info!(key, "object not present in remote store");
                return Ok(FetchOutcome::NotFound);
            }
            Err(err) => return Err(err.into()),
        }

        let mut stream = self.get_stream(key).await?;

        // Stream into a scratch file, then rename so the cache never holds a
        // half-written entry.
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let scratch = self.cache_dir.join(format!(".partial-{}", Uuid::new_v4()));
        let mut file = tokio::fs::File::create(&scratch).await?;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&scratch, &local_path).await?;

        info!(key, path = %local_path.display(), "downloaded object into cache");
        Ok(FetchOutcome::Downloaded(local_path))
    }

    /// The cache location an object would occupy, keyed by the remote key's
    /// final segment or an explicit override name.
    pub fn cache_path(&self, key: &str, dest_name: Option<&str>) -> PathBuf {
        let file_name = dest_name
            .map(ToString::to_string)
            .unwrap_or_else(|| key.rsplit('/').next().unwrap_or(key).to_string());
        self.cache_dir.join(file_name)
    }
}

/// Create a storage backend based on configuration.
async fn create_storage_backend(cfg: &AppConfig) -> Result<DynStore, AppError> {
    match cfg.storage {
        StorageKind::Local => {
            let base = PathBuf::from(&cfg.data_dir).join("objects");
            if !base.exists() {
                tokio::fs::create_dir_all(&base).await?;
            }
            let store = LocalFileSystem::new_with_prefix(base)?;
            Ok(Arc::new(store))
        }
        StorageKind::Memory => {
            let store = InMemory::new();
            Ok(Arc::new(store))
        }
        StorageKind::S3 => {
            let bucket = cfg.s3_bucket.as_deref().ok_or_else(|| {
                AppError::Validation("s3 storage selected but s3_bucket is not set".to_string())
            })?;
            let store = AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .build()?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store(cache: &Path) -> ArchiveStore {
        ArchiveStore::with_backend(
            Arc::new(InMemory::new()),
            StorageKind::Memory,
            cache.to_path_buf(),
        )
    }

    #[tokio::test]
    async fn test_upload_then_fetch_roundtrip() {
        let cache = tempfile::tempdir().expect("cache dir");
        let store = memory_store(cache.path());

        let source_dir = tempfile::tempdir().expect("source dir");
        let source = source_dir.path().join("report.pdf");
        let content = b"%PDF-1.4 test bytes";
        tokio::fs::write(&source, content).await.expect("write source");

        let key = store
            .upload_file(&source, "publications/pdfs/abc.pdf")
            .await
            .expect("upload succeeds");
        assert_eq!(key, "publications/pdfs/abc.pdf");

        let outcome = store.fetch(&key, None).await.expect("fetch");
        let path = match outcome {
            FetchOutcome::Downloaded(path) => path,
            other => panic!("expected download, got {other:?}"),
        };
        let fetched = tokio::fs::read(&path).await.expect("read cached file");
        assert_eq!(fetched, content);
    }

    #[tokio::test]
    async fn test_fetch_is_idempotent_via_cache() {
        let cache = tempfile::tempdir().expect("cache dir");
        let store = memory_store(cache.path());

        store
            .put("publications/pdfs/cached.pdf", Bytes::from_static(b"data"))
            .await
            .expect("seed object");

        let first = store
            .fetch("publications/pdfs/cached.pdf", None)
            .await
            .expect("first fetch");
        let first_path = match first {
            FetchOutcome::Downloaded(path) => path,
            other => panic!("first fetch should download, got {other:?}"),
        };

        let second = store
            .fetch("publications/pdfs/cached.pdf", None)
            .await
            .expect("second fetch");
        match second {
            FetchOutcome::Hit(path) => assert_eq!(path, first_path),
            other => panic!("second fetch should hit the cache, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_reports_confirmed_absence() {
        let cache = tempfile::tempdir().expect("cache dir");
        let store = memory_store(cache.path());

        let outcome = store
            .fetch("publications/pdfs/nope.pdf", None)
            .await
            .expect("fetch resolves");
        assert_eq!(outcome, FetchOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_fetch_honours_destination_override() {
        let cache = tempfile::tempdir().expect("cache dir");
        let store = memory_store(cache.path());

        store
            .put("publications/pdfs/deep/key.pdf", Bytes::from_static(b"x"))
            .await
            .expect("seed object");

        let outcome = store
            .fetch("publications/pdfs/deep/key.pdf", Some("article-1.pdf"))
            .await
            .expect("fetch");
        let path = outcome.path().expect("path").to_path_buf();
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("article-1.pdf")
        );
    }

    #[tokio::test]
    async fn test_upload_missing_file_returns_none() {
        let cache = tempfile::tempdir().expect("cache dir");
        let store = memory_store(cache.path());

        let missing = cache.path().join("does-not-exist.pdf");
        let result = store.upload_file(&missing, "publications/pdfs/x.pdf").await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_upload_same_key_twice_overwrites() {
        let cache = tempfile::tempdir().expect("cache dir");
        let store = memory_store(cache.path());

        let dir = tempfile::tempdir().expect("source dir");
        let source = dir.path().join("file.bin");

        tokio::fs::write(&source, b"first").await.expect("write");
        store
            .upload_file(&source, "k/file.bin")
            .await
            .expect("first upload");

        tokio::fs::write(&source, b"second").await.expect("rewrite");
        store
            .upload_file(&source, "k/file.bin")
            .await
            .expect("second upload");

        let bytes = store.get("k/file.bin").await.expect("get");
        assert_eq!(bytes.as_ref(), b"second");
    }
}
