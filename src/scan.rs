//! Batch Orchestrator and job state machine.
//!
//! [`ScanRunner::run_job`] drives one run of a job:
//!
//! ```text
//! get job ──▶ processing ──▶ stage PDF ──▶ page count ──▶ batches ──▶ completed | failed
//!                                                           │
//!                          ┌────────────────────────────────┘
//!                          ▼  (sequential; pages inside a batch run concurrently)
//!          render ──▶ extract ──▶ [crop logo] ──▶ persist DetectedBrand ──▶ progress
//! ```
//!
//! Page failures are caught at the page-task boundary and recorded in the
//! [`ScanReport`]; they never abort siblings or later batches. Only setup
//! failures (missing job, unreadable source, zero pages) come back as
//! `Err(ScanError)`, and those also leave the job `failed` with the message.

use crate::config::ScanConfig;
use crate::error::{PageError, ScanError};
use crate::model::{DetectedBrand, JobStatus, JobUpdate, NewScanJob, ScanJob};
use crate::output::{PageOutcome, ScanReport};
use crate::pipeline::crop::{self, LogoCropper};
use crate::pipeline::encode;
use crate::pipeline::extract::{LlmVisionExtractor, VisionExtractor};
use crate::pipeline::input;
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use crate::progress::{ProgressCallback, ProgressWriter};
use crate::store::{BlobStore, DetectionStore, JobStore};
use futures::stream::{self, StreamExt};
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Split pages `1..=total_pages` into consecutive batches of `batch_size`.
///
/// ```rust
/// use trademark_scan::scan::plan_batches;
///
/// assert_eq!(plan_batches(12, 10), vec![1..=10, 11..=12]);
/// assert!(plan_batches(0, 10).is_empty());
/// ```
pub fn plan_batches(total_pages: usize, batch_size: usize) -> Vec<RangeInclusive<usize>> {
    let size = batch_size.max(1);
    (1..=total_pages)
        .step_by(size)
        .map(|first| first..=(first + size - 1).min(total_pages))
        .collect()
}

/// Operator pause: `processing → paused`, needing only the job store.
///
/// Only the stored status changes. A run already executing batches keeps
/// going; the next [`ScanRunner::run_job`] starts from page 1.
pub async fn pause_job(jobs: &dyn JobStore, job_id: &str) -> Result<ScanJob, ScanError> {
    let job = transition(jobs, job_id, JobStatus::Paused, JobUpdate::status(JobStatus::Paused)).await?;
    info!(job_id = %job_id, "Job paused");
    Ok(job)
}

/// Move a job to `to`, applying `update` only if no one else changed its
/// status between the read and the write.
async fn transition(
    jobs: &dyn JobStore,
    job_id: &str,
    to: JobStatus,
    update: JobUpdate,
) -> Result<ScanJob, ScanError> {
    let not_found = || ScanError::JobNotFound {
        job_id: job_id.to_string(),
    };
    let job = jobs.get(job_id).await?.ok_or_else(not_found)?;
    let invalid = |from: JobStatus| ScanError::InvalidTransition {
        job_id: job_id.to_string(),
        from,
        to,
    };
    if !job.status.can_transition_to(to) {
        return Err(invalid(job.status));
    }

    match jobs.update_if_status(job_id, job.status, update).await? {
        Some(updated) => Ok(updated),
        None => {
            let current = jobs.get(job_id).await?.ok_or_else(not_found)?;
            debug!(job_id = %job_id, "Lost transition race: now {}", current.status);
            Err(invalid(current.status))
        }
    }
}

/// What a successful page produced.
struct PageSuccess {
    brand_name: Option<String>,
    detected_brand_id: Option<String>,
}

/// Runs scan jobs against the configured stores and backends.
pub struct ScanRunner {
    jobs: Arc<dyn JobStore>,
    detections: Arc<dyn DetectionStore>,
    blobs: Arc<dyn BlobStore>,
    renderer: Arc<dyn PageRenderer>,
    extractor: Arc<dyn VisionExtractor>,
    cropper: Option<LogoCropper>,
    config: ScanConfig,
}

impl ScanRunner {
    /// Assemble a runner from explicit backends. Logo cropping is enabled
    /// when `config.logo_dir` is set.
    pub fn new(
        jobs: Arc<dyn JobStore>,
        detections: Arc<dyn DetectionStore>,
        blobs: Arc<dyn BlobStore>,
        renderer: Arc<dyn PageRenderer>,
        extractor: Arc<dyn VisionExtractor>,
        config: ScanConfig,
    ) -> Self {
        let cropper = config.logo_dir.as_ref().map(LogoCropper::new);
        Self {
            jobs,
            detections,
            blobs,
            renderer,
            extractor,
            cropper,
            config,
        }
    }

    /// Runner with the pdfium renderer and the provider resolved from `config`.
    pub fn from_config(
        jobs: Arc<dyn JobStore>,
        detections: Arc<dyn DetectionStore>,
        blobs: Arc<dyn BlobStore>,
        config: ScanConfig,
    ) -> Result<Self, ScanError> {
        let renderer = Arc::new(PdfiumRenderer::new(config.dpi, config.max_rendered_pixels));
        let extractor = Arc::new(LlmVisionExtractor::from_config(&config)?);
        Ok(Self::new(jobs, detections, blobs, renderer, extractor, config))
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Register a new `queued` job for a submitted PDF.
    pub async fn create_job(
        &self,
        filename: impl Into<String>,
        storage_ref: impl Into<String>,
    ) -> Result<ScanJob, ScanError> {
        let job = self
            .jobs
            .create(NewScanJob {
                filename: filename.into(),
                storage_ref: storage_ref.into(),
            })
            .await?;
        info!(job_id = %job.id, "Created scan job for {}", job.filename);
        Ok(job)
    }

    /// Operator pause: `processing → paused`. See [`pause_job`].
    pub async fn pause_job(&self, job_id: &str) -> Result<ScanJob, ScanError> {
        pause_job(self.jobs.as_ref(), job_id).await
    }

    /// Run (or re-run) a job from page 1.
    ///
    /// Allowed from `queued`, `paused` and `failed`. Detections from an
    /// earlier partial run are kept; this run adds to them. The move to
    /// `processing` is a conditional store update, so of two concurrent
    /// calls on the same job only one runs.
    pub async fn run_job(&self, job_id: &str) -> Result<ScanReport, ScanError> {
        let job = transition(
            self.jobs.as_ref(),
            job_id,
            JobStatus::Processing,
            JobUpdate::status(JobStatus::Processing).with_last_error(None),
        )
        .await?;
        info!(job_id = %job_id, "Starting scan of {}", job.filename);

        match self.execute(&job).await {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!(job_id = %job_id, "Job failed during setup: {}", e);
                let update = JobUpdate::status(JobStatus::Failed).with_last_error(Some(e.to_string()));
                if let Err(store_err) = self.jobs.update(job_id, update).await {
                    warn!(job_id = %job_id, "Could not record job failure: {}", store_err);
                }
                Err(e)
            }
        }
    }

    fn callback(&self) -> Option<&ProgressCallback> {
        self.config.progress_callback.as_ref()
    }

    async fn execute(&self, job: &ScanJob) -> Result<ScanReport, ScanError> {
        let started = Instant::now();

        // ── Step 1: Stage source PDF ─────────────────────────────────────
        // Dropping `staged` removes the per-run temp dir on every path out.
        let staged = input::stage_source(
            self.blobs.as_ref(),
            &job.storage_ref,
            self.config.work_dir.as_deref(),
            self.config.download_timeout_secs,
        )
        .await?;

        // ── Step 2: Page count ───────────────────────────────────────────
        let total_pages = self.renderer.page_count(staged.path()).await?;
        if total_pages == 0 {
            return Err(ScanError::EmptyDocument {
                path: staged.path().to_path_buf(),
            });
        }
        self.jobs
            .update(
                &job.id,
                JobUpdate::default()
                    .with_total_pages(total_pages)
                    .with_progress(0),
            )
            .await?;
        if let Some(cb) = self.callback() {
            cb.on_scan_start(&job.id, total_pages);
        }

        // ── Step 3: Batches ──────────────────────────────────────────────
        let batch_size = self.config.batch_size.max(1);
        let batches = plan_batches(total_pages, batch_size);
        info!(
            job_id = %job.id,
            "{} pages in {} batches of up to {}",
            total_pages,
            batches.len(),
            batch_size
        );

        let processed = AtomicUsize::new(0);
        let writer = ProgressWriter::spawn(
            Arc::clone(&self.jobs),
            job.id.clone(),
            self.config.progress_queue,
        );

        // Completion order; the last error in this order is the one recorded.
        let mut outcomes: Vec<PageOutcome> = Vec::with_capacity(total_pages);
        {
            let (job_id, pdf) = (job.id.as_str(), staged.path());
            let (counter, progress) = (&processed, &writer);
            for (i, batch) in batches.iter().enumerate() {
                let (first, last) = (*batch.start(), *batch.end());
                debug!(job_id = %job_id, batch = i + 1, "Pages {}–{}", first, last);
                if let Some(cb) = self.callback() {
                    cb.on_batch_start(i + 1, batches.len(), first, last);
                }

                let results: Vec<PageOutcome> = stream::iter(batch.clone().map(move |page| {
                    self.process_page(job_id, pdf, page, total_pages, counter, progress)
                }))
                .buffer_unordered(batch_size)
                .collect()
                .await;
                outcomes.extend(results);
            }
        }
        writer.finish().await;

        // ── Step 4: Final status ─────────────────────────────────────────
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let failed = outcomes.len() - succeeded;
        let brands_detected = outcomes
            .iter()
            .filter(|o| o.detected_brand_id.is_some())
            .count();
        let rate_limited = outcomes
            .iter()
            .filter_map(|o| o.error.as_ref())
            .any(PageError::is_rate_limited);
        let last_observed = outcomes
            .iter()
            .rev()
            .find_map(|o| o.error.as_ref())
            .map(|e| e.to_string());

        let (status, last_error) = if succeeded == 0 && failed > 0 {
            (JobStatus::Failed, last_observed)
        } else {
            (JobStatus::Completed, None)
        };

        let processed_pages = processed.load(Ordering::SeqCst);
        self.jobs
            .update(
                &job.id,
                JobUpdate::status(status)
                    .with_progress(processed_pages)
                    .with_last_error(last_error.clone()),
            )
            .await?;

        if rate_limited {
            warn!(
                job_id = %job.id,
                "Vision provider quota exceeded on some pages; re-run the job later"
            );
        }
        info!(
            job_id = %job.id,
            "Scan {}: {}/{} pages succeeded, {} brands",
            status,
            succeeded,
            total_pages,
            brands_detected
        );
        if let Some(cb) = self.callback() {
            cb.on_scan_complete(total_pages, succeeded);
        }

        outcomes.sort_by_key(|o| o.page_num);
        Ok(ScanReport {
            job_id: job.id.clone(),
            status,
            total_pages,
            processed_pages,
            succeeded,
            failed,
            brands_detected,
            last_error,
            rate_limited,
            duration_ms: started.elapsed().as_millis() as u64,
            pages: outcomes,
        })
    }

    /// One page task. Never fails: errors become a failed [`PageOutcome`].
    async fn process_page(
        &self,
        job_id: &str,
        pdf: &Path,
        page: usize,
        total_pages: usize,
        processed: &AtomicUsize,
        writer: &ProgressWriter,
    ) -> PageOutcome {
        let start = Instant::now();
        let secs = self.config.page_timeout_secs;

        let result = if secs > 0 {
            tokio::time::timeout(Duration::from_secs(secs), self.run_page(job_id, pdf, page))
                .await
                .unwrap_or(Err(PageError::Timeout { page, secs }))
        } else {
            self.run_page(job_id, pdf, page).await
        };

        // Every attempted page counts, success or not.
        let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
        writer.report(done);
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(success) => {
                if let Some(cb) = self.callback() {
                    cb.on_page_complete(page, total_pages, success.brand_name.as_deref());
                }
                PageOutcome {
                    page_num: page,
                    success: true,
                    brand_name: success.brand_name,
                    detected_brand_id: success.detected_brand_id,
                    error: None,
                    duration_ms,
                }
            }
            Err(e) => {
                warn!(job_id = %job_id, page, "{}", e);
                if let Some(cb) = self.callback() {
                    cb.on_page_error(page, total_pages, &e.to_string());
                }
                PageOutcome::failed(page, e, duration_ms)
            }
        }
    }

    async fn run_page(&self, job_id: &str, pdf: &Path, page: usize) -> Result<PageSuccess, PageError> {
        let image = self.renderer.render_page(pdf, page).await?;
        let png = encode::to_png(&image).map_err(|e| PageError::RenderFailed {
            page,
            detail: format!("PNG encoding failed: {e}"),
        })?;

        let record = self.extractor.extract(page, &png).await?;
        let Some(name) = record.brand_name().map(str::to_string) else {
            debug!(job_id = %job_id, page, "No brand on page");
            return Ok(PageSuccess {
                brand_name: None,
                detected_brand_id: None,
            });
        };

        let logo_reference = match (&self.cropper, record.logo_region()) {
            (Some(cropper), Some(bbox)) => {
                let stem = crop::logo_stem(record.application_number.as_deref(), job_id, page);
                match cropper.crop_and_store(&image, &bbox, &stem).await {
                    Ok(path) => path.map(|p| p.display().to_string()),
                    Err(e) => {
                        warn!(job_id = %job_id, page, "Logo crop failed: {}", e);
                        None
                    }
                }
            }
            _ => None,
        };

        let brand = DetectedBrand::from_record(job_id, page, record, logo_reference);
        let detected_brand_id = brand.id.clone();
        self.detections
            .insert(brand)
            .await
            .map_err(|e| PageError::PersistFailed {
                page,
                detail: e.to_string(),
            })?;

        debug!(job_id = %job_id, page, "Detected brand '{}'", name);
        Ok(PageSuccess {
            brand_name: Some(name),
            detected_brand_id: Some(detected_brand_id),
        })
    }
}
