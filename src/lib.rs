//! # trademark-scan
//!
//! Extract trademark records from scanned registry PDFs with a Vision
//! Language Model, then reconcile them against a reference brand library.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF (blob store)
//!  │
//!  ├─ 1. Stage    download once into a per-run temp dir, check %PDF
//!  ├─ 2. Count    page count via pdfium (spawn_blocking)
//!  ├─ 3. Batch    pages 1..N in batches of 10; batches sequential,
//!  │              pages inside a batch concurrent
//!  │     ├─ render  rasterise one page
//!  │     ├─ extract one vision-model call → TrademarkRecord
//!  │     ├─ crop    logo region, if the model reported one
//!  │     └─ persist DetectedBrand, bump the shared progress counter
//!  └─ 4. Finish   completed, or failed when no page succeeded
//!
//! Matching (separate run per job)
//!  ├─ snapshot library + detections
//!  ├─ exact on normalised name, else best Levenshtein score ≥ threshold
//!  └─ replace the job's stored match set
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trademark_scan::{reconcile, ScanConfig, ScanRunner};
//! use trademark_scan::store::{FsBlobStore, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let blobs = Arc::new(FsBlobStore::new("./uploads"));
//!     // Provider auto-detected from GEMINI_API_KEY / TMSCAN_LLM_PROVIDER
//!     let config = ScanConfig::builder().logo_dir("./logos").build()?;
//!     let runner = ScanRunner::from_config(store.clone(), store.clone(), blobs, config)?;
//!
//!     let job = runner.create_job("bulletin.pdf", "bulletin.pdf").await?;
//!     let report = runner.run_job(&job.id).await?;
//!     eprintln!("{}: {} brands", report.status, report.brands_detected);
//!
//!     let ctx = reconcile::MatchContext {
//!         jobs: store.as_ref(),
//!         library: store.as_ref(),
//!         detections: store.as_ref(),
//!         matches: store.as_ref(),
//!     };
//!     for m in reconcile::run_matching(&ctx, &job.id, 70).await? {
//!         println!("{} ≈ {} ({}%)", m.detected_brand_name, m.library_brand_name, m.similarity);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tmscan` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod import;
pub mod matching;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod reconcile;
pub mod scan;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ScanConfig, ScanConfigBuilder};
pub use error::{ImportError, MatchError, PageError, ScanError, StoreError};
pub use matching::{match_brands, normalize, similarity, DEFAULT_THRESHOLD};
pub use model::{
    BoundingBox, DetectedBrand, JobStatus, JobUpdate, LibraryBrand, MatchResult, MatchType,
    NewScanJob, ScanJob, TrademarkRecord,
};
pub use output::{PageOutcome, ScanReport};
pub use progress::{NoopProgressCallback, ProgressCallback, ScanProgressCallback};
pub use reconcile::{run_matching, MatchContext};
pub use scan::ScanRunner;
