//! Domain records shared by the pipeline, the stores and the matching engine.
//!
//! ## Ownership
//!
//! - [`ScanJob`] is created on PDF submission and mutated only by
//!   [`crate::scan::ScanRunner`] (through [`JobUpdate`]s).
//! - [`DetectedBrand`] is created once per successful page extraction and is
//!   immutable afterwards.
//! - [`LibraryBrand`] lives outside the core; matching only reads it.
//! - [`MatchResult`] sets are replaced wholesale each time matching re-runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ── Job state machine ────────────────────────────────────────────────────

/// Lifecycle status of a [`ScanJob`].
///
/// ```text
/// queued ──▶ processing ──▶ completed
///   ▲            │  ▲  └───▶ failed ──┐
///   │            ▼  │                 │ (manual re-run)
///   │          paused                 │
///   └─────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Processing,
    Paused,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Queued, Processing) | (Paused, Processing) | (Failed, Processing) => true,
            (Processing, Completed) | (Processing, Failed) | (Processing, Paused) => true,
            (Queued, _) | (Processing, _) | (Paused, _) | (Completed, _) | (Failed, _) => false,
        }
    }

    /// `completed` and `failed` end a run.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One PDF submitted for extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: String,
    pub filename: String,
    /// Key understood by the configured [`crate::store::BlobStore`].
    pub storage_ref: String,
    pub status: JobStatus,
    /// Set once the page count is known.
    pub total_pages: usize,
    /// Pages attempted so far in the current run. Never decreases within a run.
    pub progress_pages: usize,
    pub last_error: Option<String>,
}

/// Fields needed to create a job; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScanJob {
    pub filename: String,
    pub storage_ref: String,
}

/// Partial update applied by [`crate::store::JobStore::update`].
///
/// `None` leaves a field untouched. `last_error: Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub total_pages: Option<usize>,
    pub progress_pages: Option<usize>,
    pub last_error: Option<Option<String>>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn progress(progress_pages: usize) -> Self {
        Self {
            progress_pages: Some(progress_pages),
            ..Default::default()
        }
    }

    pub fn with_total_pages(mut self, total: usize) -> Self {
        self.total_pages = Some(total);
        self
    }

    pub fn with_progress(mut self, progress_pages: usize) -> Self {
        self.progress_pages = Some(progress_pages);
        self
    }

    pub fn with_last_error(mut self, error: Option<String>) -> Self {
        self.last_error = Some(error);
        self
    }

    /// Apply this update to a job in place.
    pub fn apply(&self, job: &mut ScanJob) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(total) = self.total_pages {
            job.total_pages = total;
        }
        if let Some(progress) = self.progress_pages {
            job.progress_pages = progress;
        }
        if let Some(ref err) = self.last_error {
            job.last_error = err.clone();
        }
    }
}

// ── Extraction records ───────────────────────────────────────────────────

/// Logo location on a page, on the 0–1000 normalised scale the vision
/// model reports regardless of actual image resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub ymin: f64,
    pub xmin: f64,
    pub ymax: f64,
    pub xmax: f64,
}

impl BoundingBox {
    /// Upper bound of the normalised coordinate space.
    pub const SCALE: f64 = 1000.0;

    /// Build from the model's `[ymin, xmin, ymax, xmax]` array.
    ///
    /// Returns `None` unless exactly four values are present.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [ymin, xmin, ymax, xmax] => Some(Self {
                ymin: *ymin,
                xmin: *xmin,
                ymax: *ymax,
                xmax: *xmax,
            }),
            _ => None,
        }
    }

    /// An all-zero box, or one that encloses no area, means "no logo".
    pub fn is_trivial(&self) -> bool {
        let all_zero = [self.ymin, self.xmin, self.ymax, self.xmax]
            .iter()
            .all(|v| *v == 0.0);
        all_zero || self.ymax <= self.ymin || self.xmax <= self.xmin
    }
}

/// Structured record returned by the vision extractor for one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrademarkRecord {
    /// Word mark. Empty means "no brand on this page".
    pub brand_name: String,
    pub application_number: Option<String>,
    /// INID 151, `YYYY-MM-DD` when the model follows instructions.
    pub filing_date: Option<String>,
    /// INID 180.
    pub expiry_date: Option<String>,
    /// INID 732.
    pub owner: Option<String>,
    /// INID 511.
    pub nice_classes: Vec<String>,
    /// INID 591.
    pub colors: Option<String>,
    pub description: Option<String>,
    pub logo_box: Option<BoundingBox>,
}

impl TrademarkRecord {
    /// Trimmed brand name, or `None` when the page carried no brand.
    pub fn brand_name(&self) -> Option<&str> {
        let name = self.brand_name.trim();
        (!name.is_empty()).then_some(name)
    }

    /// Logo box worth cropping, if any.
    pub fn logo_region(&self) -> Option<BoundingBox> {
        self.logo_box.filter(|b| !b.is_trivial())
    }
}

/// One brand detected on one page of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedBrand {
    pub id: String,
    pub job_id: String,
    pub name: String,
    pub normalized_name: String,
    /// Pages the brand was seen on. The pipeline writes one record per page;
    /// merging across pages is left to callers.
    pub source_pages: BTreeSet<usize>,
    pub logo_reference: Option<String>,
    pub nice_classes: Vec<String>,
    pub application_number: Option<String>,
    pub filing_date: Option<String>,
    pub expiry_date: Option<String>,
    pub owner: Option<String>,
    pub colors: Option<String>,
    pub description: Option<String>,
}

impl DetectedBrand {
    /// Build a detection from a page record. The record must carry a brand name.
    pub fn from_record(
        job_id: &str,
        page_num: usize,
        record: TrademarkRecord,
        logo_reference: Option<String>,
    ) -> Self {
        let name = record.brand_name.trim().to_string();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            normalized_name: crate::matching::normalize(&name),
            name,
            source_pages: BTreeSet::from([page_num]),
            logo_reference,
            nice_classes: record.nice_classes,
            application_number: record.application_number,
            filing_date: record.filing_date,
            expiry_date: record.expiry_date,
            owner: record.owner,
            colors: record.colors,
            description: record.description,
        }
    }
}

/// One entry of the user's reference brand set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryBrand {
    pub id: String,
    pub name: String,
    /// Exact-match key.
    pub normalized_name: String,
    /// Free-text logo description from the import sheet.
    #[serde(default)]
    pub logo_text: Option<String>,
    #[serde(default)]
    pub registration_number: Option<String>,
    #[serde(default)]
    pub nice_class: Option<String>,
    #[serde(default)]
    pub filing_date: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl LibraryBrand {
    /// New entry with a fresh id and its normalised key filled in.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            normalized_name: crate::matching::normalize(&name),
            name,
            ..Default::default()
        }
    }
}

// ── Matching ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Fuzzy,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchType::Exact => f.write_str("exact"),
            MatchType::Fuzzy => f.write_str("fuzzy"),
        }
    }
}

/// Best library match for one detected brand.
///
/// `similarity == 100` exactly when `match_type == Exact`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub job_id: String,
    pub library_brand_id: String,
    pub library_brand_name: String,
    pub detected_brand_id: String,
    pub detected_brand_name: String,
    pub similarity: u8,
    pub match_type: MatchType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(Processing));
        assert!(Paused.can_transition_to(Processing));
        assert!(Failed.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Paused));
    }

    #[test]
    fn illegal_transitions() {
        use JobStatus::*;
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Processing.can_transition_to(Processing));
        assert!(!Queued.can_transition_to(Paused));
        assert!(!Queued.can_transition_to(Completed));
        assert!(!Paused.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Paused));
    }

    #[test]
    fn status_serialises_lowercase() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
        assert!(JobStatus::Completed.is_terminal());
        assert!(!JobStatus::Paused.is_terminal());
    }

    #[test]
    fn job_update_applies_only_set_fields() {
        let mut job = ScanJob {
            id: "j".into(),
            filename: "a.pdf".into(),
            storage_ref: "a.pdf".into(),
            status: JobStatus::Processing,
            total_pages: 12,
            progress_pages: 3,
            last_error: Some("old".into()),
        };
        JobUpdate::progress(5).apply(&mut job);
        assert_eq!(job.progress_pages, 5);
        assert_eq!(job.total_pages, 12);
        assert_eq!(job.last_error.as_deref(), Some("old"));

        JobUpdate::status(JobStatus::Completed)
            .with_last_error(None)
            .apply(&mut job);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.last_error, None);
    }

    #[test]
    fn bounding_box_requires_four_values() {
        assert!(BoundingBox::from_slice(&[]).is_none());
        assert!(BoundingBox::from_slice(&[1.0, 2.0, 3.0]).is_none());
        let b = BoundingBox::from_slice(&[100.0, 200.0, 300.0, 400.0]).unwrap();
        assert_eq!(b.xmin, 200.0);
        assert!(!b.is_trivial());
    }

    #[test]
    fn zero_or_inverted_box_is_trivial() {
        assert!(BoundingBox::from_slice(&[0.0, 0.0, 0.0, 0.0])
            .unwrap()
            .is_trivial());
        assert!(BoundingBox::from_slice(&[500.0, 100.0, 400.0, 300.0])
            .unwrap()
            .is_trivial());
    }

    #[test]
    fn record_with_blank_name_has_no_brand() {
        let record = TrademarkRecord {
            brand_name: "   ".into(),
            ..Default::default()
        };
        assert_eq!(record.brand_name(), None);
    }

    #[test]
    fn detected_brand_from_record_normalises_name() {
        let record = TrademarkRecord {
            brand_name: "  NIKE ".into(),
            application_number: Some("123".into()),
            nice_classes: vec!["25".into()],
            ..Default::default()
        };
        let brand = DetectedBrand::from_record("job-1", 7, record, None);
        assert_eq!(brand.name, "NIKE");
        assert_eq!(brand.normalized_name, "nike");
        assert_eq!(brand.source_pages, BTreeSet::from([7]));
        assert_eq!(brand.job_id, "job-1");
        assert!(!brand.id.is_empty());
    }
}
