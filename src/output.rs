//! Results of a scan run.

use crate::error::PageError;
use crate::model::JobStatus;
use serde::{Deserialize, Serialize};

/// Outcome of one page task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOutcome {
    /// 1-indexed page number.
    pub page_num: usize,
    pub success: bool,
    /// Extracted brand name; `None` on failure or when the page had no brand.
    pub brand_name: Option<String>,
    /// Id of the persisted [`crate::model::DetectedBrand`], if one was written.
    pub detected_brand_id: Option<String>,
    pub error: Option<PageError>,
    pub duration_ms: u64,
}

impl PageOutcome {
    pub fn failed(page_num: usize, error: PageError, duration_ms: u64) -> Self {
        Self {
            page_num,
            success: false,
            brand_name: None,
            detected_brand_id: None,
            error: Some(error),
            duration_ms,
        }
    }
}

/// Summary of a finished run, returned by [`crate::scan::ScanRunner::run_job`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub job_id: String,
    /// Terminal status written to the job store.
    pub status: JobStatus,
    pub total_pages: usize,
    /// Pages attempted, successful or not. Equals `total_pages` after a run.
    pub processed_pages: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub brands_detected: usize,
    /// Last page error observed, as stored on a failed job.
    pub last_error: Option<String>,
    /// At least one page hit a provider quota or rate limit.
    pub rate_limited: bool,
    pub duration_ms: u64,
    /// Per-page outcomes sorted by page number.
    pub pages: Vec<PageOutcome>,
}

impl ScanReport {
    /// Whether re-running the job later may help: it failed, or pages were
    /// lost to rate limiting.
    pub fn is_retryable(&self) -> bool {
        self.rate_limited || self.status == JobStatus::Failed
    }

    /// Page outcomes that carry an error.
    pub fn failures(&self) -> impl Iterator<Item = &PageOutcome> {
        self.pages.iter().filter(|p| p.error.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: JobStatus, rate_limited: bool) -> ScanReport {
        ScanReport {
            job_id: "j".into(),
            status,
            total_pages: 2,
            processed_pages: 2,
            succeeded: 1,
            failed: 1,
            brands_detected: 1,
            last_error: None,
            rate_limited,
            duration_ms: 0,
            pages: vec![PageOutcome::failed(
                2,
                PageError::Timeout { page: 2, secs: 1 },
                1000,
            )],
        }
    }

    #[test]
    fn retryable_when_failed_or_rate_limited() {
        assert!(!report(JobStatus::Completed, false).is_retryable());
        assert!(report(JobStatus::Completed, true).is_retryable());
        assert!(report(JobStatus::Failed, false).is_retryable());
    }

    #[test]
    fn failures_lists_errored_pages() {
        let r = report(JobStatus::Completed, false);
        let pages: Vec<usize> = r.failures().map(|p| p.page_num).collect();
        assert_eq!(pages, vec![2]);
    }
}
