//! Contracts with the external keyed stores.
//!
//! The core never talks to a database directly. Jobs, detections, matches,
//! the brand library and source blobs are reached through the traits below,
//! so a host can back them with Postgres, an object store, or the bundled
//! [`MemoryStore`].
//!
//! All traits are `Send + Sync`; page tasks in a batch call
//! [`DetectionStore::insert`] concurrently.

pub mod blob;
pub mod memory;

pub use blob::{FsBlobStore, HttpBlobStore};
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::model::{
    DetectedBrand, JobStatus, JobUpdate, LibraryBrand, MatchResult, NewScanJob, ScanJob,
};
use async_trait::async_trait;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Scan job persistence.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `queued` job and return it with its assigned id.
    async fn create(&self, job: NewScanJob) -> StoreResult<ScanJob>;

    async fn get(&self, id: &str) -> StoreResult<Option<ScanJob>>;

    /// Apply a partial update. Unknown ids are [`StoreError::NotFound`].
    async fn update(&self, id: &str, update: JobUpdate) -> StoreResult<()>;

    /// Apply `update` only if the job's status is still `expected`, as one
    /// atomic step. Returns the updated job, or `None` when the status had
    /// already changed. Unknown ids are [`StoreError::NotFound`].
    async fn update_if_status(
        &self,
        id: &str,
        expected: JobStatus,
        update: JobUpdate,
    ) -> StoreResult<Option<ScanJob>>;

    async fn list(&self) -> StoreResult<Vec<ScanJob>>;
}

/// Per-page detection records.
#[async_trait]
pub trait DetectionStore: Send + Sync {
    async fn insert(&self, brand: DetectedBrand) -> StoreResult<()>;

    async fn list_for_job(&self, job_id: &str) -> StoreResult<Vec<DetectedBrand>>;
}

/// Match result sets, replaced wholesale per job.
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn delete_for_job(&self, job_id: &str) -> StoreResult<()>;

    async fn insert_many(&self, matches: Vec<MatchResult>) -> StoreResult<()>;

    /// Stored results for a job, highest similarity first.
    async fn list_for_job(&self, job_id: &str) -> StoreResult<Vec<MatchResult>>;
}

/// Read access to the reference brand set.
#[async_trait]
pub trait LibraryStore: Send + Sync {
    async fn list(&self) -> StoreResult<Vec<LibraryBrand>>;
}

/// Source PDF storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn download(&self, storage_ref: &str) -> StoreResult<Vec<u8>>;
}
