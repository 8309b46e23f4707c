//! Match runs: reconcile a job's detections against the brand library and
//! replace the job's stored match set.
//!
//! The library and the detections are snapshotted once at the start of the
//! run; writes that land while it runs are not observed. Results are computed
//! before anything is deleted, so a failed snapshot or an invalid threshold
//! leaves the previous match set untouched.

use crate::error::MatchError;
use crate::matching::match_brands;
use crate::model::MatchResult;
use crate::store::{DetectionStore, JobStore, LibraryStore, MatchStore};
use tracing::{debug, info};

/// Stores a match run reads from and writes to.
pub struct MatchContext<'a> {
    pub jobs: &'a dyn JobStore,
    pub library: &'a dyn LibraryStore,
    pub detections: &'a dyn DetectionStore,
    pub matches: &'a dyn MatchStore,
}

/// Run matching for `job_id` and replace its stored results.
///
/// Returns the new match set, highest similarity first. Re-running is
/// idempotent: the previous set is deleted before the new one is inserted,
/// even when the new one is empty.
pub async fn run_matching(
    ctx: &MatchContext<'_>,
    job_id: &str,
    threshold: u8,
) -> Result<Vec<MatchResult>, MatchError> {
    if threshold > 100 {
        return Err(MatchError::InvalidThreshold(threshold));
    }

    let exists = ctx
        .jobs
        .get(job_id)
        .await
        .map_err(MatchError::DetectionsUnavailable)?
        .is_some();
    if !exists {
        return Err(MatchError::JobNotFound {
            job_id: job_id.to_string(),
        });
    }

    let library = ctx
        .library
        .list()
        .await
        .map_err(MatchError::LibraryUnavailable)?;
    let detected = ctx
        .detections
        .list_for_job(job_id)
        .await
        .map_err(MatchError::DetectionsUnavailable)?;
    debug!(
        job_id = %job_id,
        "Matching {} detections against {} library brands",
        detected.len(),
        library.len()
    );

    let results = match_brands(&library, &detected, threshold)?;

    ctx.matches
        .delete_for_job(job_id)
        .await
        .map_err(MatchError::PersistFailed)?;
    if !results.is_empty() {
        ctx.matches
            .insert_many(results.clone())
            .await
            .map_err(MatchError::PersistFailed)?;
    }

    info!(
        job_id = %job_id,
        "Matching complete: {} matches ({} exact)",
        results.len(),
        results.iter().filter(|m| m.similarity == 100).count()
    );
    Ok(results)
}
