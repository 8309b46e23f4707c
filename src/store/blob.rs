//! Blob stores that hand the source PDF to a scan run.

use super::{BlobStore, StoreResult};
use crate::error::StoreError;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Reads blobs from a directory. The storage ref is a path relative to `root`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `storage_ref` under the root, refusing `..` and absolute refs.
    fn resolve(&self, storage_ref: &str) -> StoreResult<PathBuf> {
        let rel = Path::new(storage_ref);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || storage_ref.is_empty() {
            return Err(StoreError::NotFound {
                kind: "blob",
                id: storage_ref.to_string(),
            });
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn download(&self, storage_ref: &str) -> StoreResult<Vec<u8>> {
        let path = self.resolve(storage_ref)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!("Read blob {} ({} bytes)", path.display(), bytes.len());
                Ok(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                kind: "blob",
                id: storage_ref.to_string(),
            }),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

/// Fetches blobs over HTTP(S). The storage ref is either a full URL or a
/// path appended to `base_url`.
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpBlobStore {
    pub fn new(base_url: Option<String>, timeout_secs: u64) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn url_for(&self, storage_ref: &str) -> String {
        if is_url(storage_ref) {
            return storage_ref.to_string();
        }
        match &self.base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                storage_ref.trim_start_matches('/')
            ),
            None => storage_ref.to_string(),
        }
    }
}

/// Whether the string looks like an HTTP(S) URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn download(&self, storage_ref: &str) -> StoreResult<Vec<u8>> {
        let url = self.url_for(storage_ref);
        info!("Downloading source PDF from: {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Backend(format!("request to {url} timed out"))
            } else {
                StoreError::Backend(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                kind: "blob",
                id: storage_ref.to_string(),
            });
        }
        if !status.is_success() {
            return Err(StoreError::Backend(format!("HTTP {status} for {url}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        debug!("Downloaded {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn http_url_joins_base_and_ref() {
        let store = HttpBlobStore::new(Some("https://cdn.example.com/pdfs/".into()), 5).unwrap();
        assert_eq!(
            store.url_for("/2024/bulletin.pdf"),
            "https://cdn.example.com/pdfs/2024/bulletin.pdf"
        );
        assert_eq!(
            store.url_for("https://other.example.com/x.pdf"),
            "https://other.example.com/x.pdf"
        );
    }

    #[tokio::test]
    async fn fs_store_reads_relative_refs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("scans")).unwrap();
        std::fs::write(dir.path().join("scans/a.pdf"), b"%PDF-1.7").unwrap();

        let store = FsBlobStore::new(dir.path());
        let bytes = store.download("scans/a.pdf").await.unwrap();
        assert_eq!(bytes, b"%PDF-1.7");
    }

    #[tokio::test]
    async fn fs_store_missing_and_escaping_refs_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(matches!(
            store.download("missing.pdf").await,
            Err(StoreError::NotFound { kind: "blob", .. })
        ));
        assert!(matches!(
            store.download("../etc/passwd").await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
