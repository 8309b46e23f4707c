//! In-process implementation of every store trait.
//!
//! State lives behind a single `tokio::sync::RwLock`. The CLI persists it
//! between invocations as a JSON snapshot via [`MemoryStore::load`] and
//! [`MemoryStore::save`].

use super::{DetectionStore, JobStore, LibraryStore, MatchStore, StoreResult};
use crate::error::StoreError;
use crate::matching::normalize;
use crate::model::{
    DetectedBrand, JobStatus, JobUpdate, LibraryBrand, MatchResult, NewScanJob, ScanJob,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct State {
    #[serde(default)]
    jobs: Vec<ScanJob>,
    #[serde(default)]
    detections: Vec<DetectedBrand>,
    #[serde(default)]
    matches: Vec<MatchResult>,
    #[serde(default)]
    library: Vec<LibraryBrand>,
}

/// Jobs, detections, matches and the brand library held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot written by [`MemoryStore::save`]. A missing file gives
    /// an empty store.
    pub async fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No snapshot at {}, starting empty", path.display());
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let state: State = serde_json::from_slice(&bytes)?;
        debug!(
            "Loaded snapshot {}: {} jobs, {} detections, {} library brands",
            path.display(),
            state.jobs.len(),
            state.detections.len(),
            state.library.len()
        );
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Write a JSON snapshot (temp file + rename).
    pub async fn save(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref();
        let json = {
            let state = self.state.read().await;
            serde_json::to_vec_pretty(&*state)?
        };

        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(io_err)?;
        Ok(())
    }

    /// Add brands to the library and return how many were inserted.
    ///
    /// Entries with a blank name are dropped. Within `brands` the first
    /// occurrence of a normalised name wins; names already in the library are
    /// skipped rather than overwritten.
    pub async fn add_library_brands(&self, brands: Vec<LibraryBrand>) -> usize {
        let mut state = self.state.write().await;
        let mut seen: HashSet<String> = state
            .library
            .iter()
            .map(|b| b.normalized_name.clone())
            .collect();

        let mut inserted = 0;
        for mut brand in brands {
            brand.normalized_name = normalize(&brand.name);
            if brand.normalized_name.is_empty() || !seen.insert(brand.normalized_name.clone()) {
                continue;
            }
            if brand.id.is_empty() {
                brand.id = uuid::Uuid::new_v4().to_string();
            }
            state.library.push(brand);
            inserted += 1;
        }
        info!("Library import: {} new brands", inserted);
        inserted
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create(&self, job: NewScanJob) -> StoreResult<ScanJob> {
        let job = ScanJob {
            id: uuid::Uuid::new_v4().to_string(),
            filename: job.filename,
            storage_ref: job.storage_ref,
            status: JobStatus::Queued,
            total_pages: 0,
            progress_pages: 0,
            last_error: None,
        };
        self.state.write().await.jobs.push(job.clone());
        Ok(job)
    }

    async fn get(&self, id: &str) -> StoreResult<Option<ScanJob>> {
        let state = self.state.read().await;
        Ok(state.jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn update(&self, id: &str, update: JobUpdate) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "job",
                id: id.to_string(),
            })?;
        update.apply(job);
        Ok(())
    }

    async fn update_if_status(
        &self,
        id: &str,
        expected: JobStatus,
        update: JobUpdate,
    ) -> StoreResult<Option<ScanJob>> {
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "job",
                id: id.to_string(),
            })?;
        if job.status != expected {
            return Ok(None);
        }
        update.apply(job);
        Ok(Some(job.clone()))
    }

    async fn list(&self) -> StoreResult<Vec<ScanJob>> {
        Ok(self.state.read().await.jobs.clone())
    }
}

#[async_trait]
impl DetectionStore for MemoryStore {
    async fn insert(&self, brand: DetectedBrand) -> StoreResult<()> {
        self.state.write().await.detections.push(brand);
        Ok(())
    }

    async fn list_for_job(&self, job_id: &str) -> StoreResult<Vec<DetectedBrand>> {
        let state = self.state.read().await;
        Ok(state
            .detections
            .iter()
            .filter(|d| d.job_id == job_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn delete_for_job(&self, job_id: &str) -> StoreResult<()> {
        self.state.write().await.matches.retain(|m| m.job_id != job_id);
        Ok(())
    }

    async fn insert_many(&self, matches: Vec<MatchResult>) -> StoreResult<()> {
        self.state.write().await.matches.extend(matches);
        Ok(())
    }

    async fn list_for_job(&self, job_id: &str) -> StoreResult<Vec<MatchResult>> {
        let state = self.state.read().await;
        let mut out: Vec<MatchResult> = state
            .matches
            .iter()
            .filter(|m| m.job_id == job_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.similarity.cmp(&a.similarity));
        Ok(out)
    }
}

#[async_trait]
impl LibraryStore for MemoryStore {
    async fn list(&self) -> StoreResult<Vec<LibraryBrand>> {
        Ok(self.state.read().await.library.clone())
    }
}
