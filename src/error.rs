//! Error types for the trademark-scan library.
//!
//! Five error types reflect five distinct failure modes:
//!
//! * [`ScanError`] — **Fatal**: a scan job cannot start or cannot continue
//!   (job missing, source PDF unreadable, provider not configured). Returned
//!   as `Err(ScanError)` from [`crate::scan::ScanRunner`] entry points.
//!
//! * [`PageError`] — **Non-fatal**: a single page failed (render glitch,
//!   model error, quota hit) but every other page keeps going. Stored inside
//!   [`crate::output::PageOutcome`] so callers can inspect partial success.
//!
//! * [`StoreError`] — a keyed store (jobs, detections, matches, library,
//!   blobs) rejected an operation.
//!
//! * [`MatchError`] — the matching run could not produce a valid result
//!   list. Matching never returns a partial list.
//!
//! * [`ImportError`] — a brand library spreadsheet could not be read.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned while creating or running a scan job.
///
/// Page-level failures use [`PageError`] and are absorbed into the
/// [`crate::output::ScanReport`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ScanError {
    // ── Job errors ────────────────────────────────────────────────────────
    /// No job exists with the given id.
    #[error("Job execution failed: job '{job_id}' not found")]
    JobNotFound { job_id: String },

    /// The job's current status does not allow the requested transition.
    #[error("Job '{job_id}' cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        job_id: String,
        from: crate::model::JobStatus,
        to: crate::model::JobStatus,
    },

    // ── Source errors ─────────────────────────────────────────────────────
    /// The blob store could not provide the source PDF.
    #[error("Job execution failed: could not download '{storage_ref}': {reason}")]
    SourceUnavailable { storage_ref: String, reason: String },

    /// Downloading the source PDF exceeded the configured timeout.
    #[error("Job execution failed: download of '{storage_ref}' timed out after {secs}s")]
    DownloadTimeout { storage_ref: String, secs: u64 },

    /// The source was fetched but is not a PDF.
    #[error("Job execution failed: '{storage_ref}' is not a valid PDF (first bytes: {magic:?})")]
    NotAPdf { storage_ref: String, magic: Vec<u8> },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("Job execution failed: PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password; registry scans are expected to be open.
    #[error("Job execution failed: PDF '{path}' is encrypted and requires a password")]
    PasswordRequired { path: PathBuf },

    /// The PDF opened but has no pages to scan.
    #[error("Job execution failed: PDF '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Install libpdfium or set PDFIUM_LIB_PATH=/path/to/libpdfium."
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured vision provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config / store / catch-all ────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A store operation required by the job itself failed.
    #[error("Job execution failed: {0}")]
    Store(#[from] StoreError),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// Converted into a `{success: false, error}` [`crate::output::PageOutcome`]
/// at the page-task boundary. Never aborts sibling pages or later batches.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The renderer was asked for a page the document does not have.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// The vision model call failed.
    #[error("Page {page}: extraction failed: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    /// The vision provider reported a quota or rate limit. Retryable by the
    /// caller; the pipeline itself never retries.
    #[error("Page {page}: API quota exceeded, try again later ({detail})")]
    RateLimited { page: usize, detail: String },

    /// The model answered but the payload was not the expected JSON record.
    #[error("Page {page}: malformed model response: {detail}")]
    MalformedResponse { page: usize, detail: String },

    /// The page task exceeded the per-page timeout.
    #[error("Page {page}: timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// The extracted record could not be written to the detection store.
    #[error("Page {page}: failed to persist detected brand: {detail}")]
    PersistFailed { page: usize, detail: String },
}

impl PageError {
    /// The 1-indexed page this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::PageOutOfRange { page, .. }
            | PageError::ExtractionFailed { page, .. }
            | PageError::RateLimited { page, .. }
            | PageError::MalformedResponse { page, .. }
            | PageError::Timeout { page, .. }
            | PageError::PersistFailed { page, .. } => *page,
        }
    }

    /// `true` for quota / rate-limit failures.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PageError::RateLimited { .. })
    }
}

/// Errors raised by the external keyed stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store serialisation error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors returned by a matching run.
///
/// Only contract violations and store failures end up here; an entry that
/// simply has no match is omitted from the result list, never an error.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Threshold outside `0..=100`.
    #[error("Matching failed: threshold must be 0–100, got {0}")]
    InvalidThreshold(u8),

    #[error("Matching failed: job '{job_id}' not found")]
    JobNotFound { job_id: String },

    /// The library snapshot could not be read.
    #[error("Matching failed: brand library unavailable: {0}")]
    LibraryUnavailable(#[source] StoreError),

    /// The job or its detected brands could not be read.
    #[error("Matching failed: detected brands unavailable: {0}")]
    DetectionsUnavailable(#[source] StoreError),

    /// Clearing or inserting match rows failed.
    #[error("Matching failed: could not store results: {0}")]
    PersistFailed(#[source] StoreError),
}

/// Errors returned while reading a brand library spreadsheet.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Import failed: cannot open workbook '{path}': {detail}")]
    Open { path: PathBuf, detail: String },

    #[error("Import failed: workbook '{path}' has no sheets")]
    NoSheet { path: PathBuf },

    #[error("Import failed: the first sheet of '{path}' is empty")]
    EmptySheet { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobStatus;

    #[test]
    fn setup_errors_read_as_job_execution_failures() {
        let e = ScanError::JobNotFound {
            job_id: "abc".into(),
        };
        assert!(e.to_string().starts_with("Job execution failed"));

        let e = ScanError::SourceUnavailable {
            storage_ref: "scans/x.pdf".into(),
            reason: "404".into(),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("Job execution failed"), "got: {msg}");
        assert!(msg.contains("scans/x.pdf"));
    }

    #[test]
    fn invalid_transition_display() {
        let e = ScanError::InvalidTransition {
            job_id: "j1".into(),
            from: JobStatus::Completed,
            to: JobStatus::Processing,
        };
        let msg = e.to_string();
        assert!(msg.contains("completed"), "got: {msg}");
        assert!(msg.contains("processing"), "got: {msg}");
    }

    #[test]
    fn rate_limit_is_distinct() {
        let e = PageError::RateLimited {
            page: 4,
            detail: "429 Too Many Requests".into(),
        };
        assert!(e.is_rate_limited());
        assert_eq!(e.page(), 4);
        assert!(e.to_string().contains("quota"));

        let e = PageError::ExtractionFailed {
            page: 4,
            detail: "boom".into(),
        };
        assert!(!e.is_rate_limited());
    }

    #[test]
    fn timeout_display() {
        let e = PageError::Timeout { page: 3, secs: 120 };
        assert!(e.to_string().contains("120s"));
        assert!(e.to_string().contains("Page 3"));
    }

    #[test]
    fn match_error_display() {
        let e = MatchError::InvalidThreshold(140);
        assert!(e.to_string().contains("140"));
    }
}
