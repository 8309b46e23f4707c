//! Source staging: fetch the job's PDF once and park it in a per-run temp dir.
//!
//! pdfium needs a file-system path, so the blob is written to disk. The
//! `TempDir` is owned by [`StagedSource`]; dropping it removes the file on
//! every exit path of a run, including early returns and panics. The `%PDF`
//! magic is checked up front so a bad upload fails as a setup error instead
//! of a pdfium crash.

use crate::error::{ScanError, StoreError};
use crate::store::BlobStore;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";
const STAGED_FILENAME: &str = "source.pdf";

/// A source PDF staged for one run. Removed from disk on drop.
#[derive(Debug)]
pub struct StagedSource {
    path: PathBuf,
    temp_dir: TempDir,
}

impl StagedSource {
    /// Path to the staged PDF.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The per-run directory holding the staged PDF.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }
}

/// Download `storage_ref` from `blobs` into a fresh temp dir.
///
/// `work_dir` is the parent for the temp dir (system temp when `None`).
/// `timeout_secs == 0` disables the download timeout.
pub async fn stage_source(
    blobs: &dyn BlobStore,
    storage_ref: &str,
    work_dir: Option<&Path>,
    timeout_secs: u64,
) -> Result<StagedSource, ScanError> {
    info!("Staging source PDF: {}", storage_ref);

    let download = blobs.download(storage_ref);
    let result = if timeout_secs > 0 {
        tokio::time::timeout(Duration::from_secs(timeout_secs), download)
            .await
            .map_err(|_| ScanError::DownloadTimeout {
                storage_ref: storage_ref.to_string(),
                secs: timeout_secs,
            })?
    } else {
        download.await
    };

    let bytes = result.map_err(|e| source_unavailable(storage_ref, e))?;

    if bytes.len() < PDF_MAGIC.len() || &bytes[..PDF_MAGIC.len()] != PDF_MAGIC {
        return Err(ScanError::NotAPdf {
            storage_ref: storage_ref.to_string(),
            magic: bytes.iter().take(PDF_MAGIC.len()).copied().collect(),
        });
    }

    let mut builder = tempfile::Builder::new();
    builder.prefix("tmscan-");
    let temp_dir = match work_dir {
        Some(dir) => builder.tempdir_in(dir),
        None => builder.tempdir(),
    }
    .map_err(|e| ScanError::Internal(format!("Failed to create temp dir: {e}")))?;

    let path = temp_dir.path().join(STAGED_FILENAME);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| ScanError::Internal(format!("Failed to write temp file: {e}")))?;

    debug!("Staged {} bytes at {}", bytes.len(), path.display());
    Ok(StagedSource { path, temp_dir })
}

fn source_unavailable(storage_ref: &str, err: StoreError) -> ScanError {
    ScanError::SourceUnavailable {
        storage_ref: storage_ref.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsBlobStore;

    #[tokio::test]
    async fn staged_file_is_removed_on_drop() {
        let blobs_dir = tempfile::tempdir().unwrap();
        std::fs::write(blobs_dir.path().join("a.pdf"), b"%PDF-1.4 body").unwrap();
        let work = tempfile::tempdir().unwrap();

        let blobs = FsBlobStore::new(blobs_dir.path());
        let staged = stage_source(&blobs, "a.pdf", Some(work.path()), 5)
            .await
            .unwrap();
        let dir = staged.dir().to_path_buf();
        assert!(dir.starts_with(work.path()));
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"%PDF-1.4 body");

        drop(staged);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn non_pdf_is_rejected_with_magic() {
        let blobs_dir = tempfile::tempdir().unwrap();
        std::fs::write(blobs_dir.path().join("a.png"), b"\x89PNG....").unwrap();
        let blobs = FsBlobStore::new(blobs_dir.path());

        let err = stage_source(&blobs, "a.png", None, 5).await.unwrap_err();
        match err {
            ScanError::NotAPdf { magic, .. } => assert_eq!(magic, b"\x89PNG".to_vec()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_blob_is_source_unavailable() {
        let blobs_dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(blobs_dir.path());
        let err = stage_source(&blobs, "gone.pdf", None, 0).await.unwrap_err();
        assert!(matches!(err, ScanError::SourceUnavailable { .. }));
        assert!(err.to_string().starts_with("Job execution failed"));
    }
}
