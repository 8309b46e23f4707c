//! Pipeline stages for one scan run.
//!
//! Each submodule implements one step. The renderer and the extractor sit
//! behind traits so tests (and alternate backends) can replace pdfium or the
//! vision model without touching the orchestrator.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ extract ──▶ postprocess ──▶ crop
//! (blob)    (pdfium)   (PNG)      (VLM)       (JSON record)  (logo)
//! ```
//!
//! 1. [`input`]   — fetch the source PDF into a per-run temp dir
//! 2. [`render`]  — count pages and rasterise one page; `spawn_blocking`
//! 3. [`encode`]  — PNG-encode and base64-wrap the page for the request body
//! 4. [`extract`] — one vision-model call per page, quota errors classified
//! 5. [`postprocess`] — tolerant parse of the model's JSON answer
//! 6. [`crop`]    — cut and store the logo when a non-trivial box is present

pub mod crop;
pub mod encode;
pub mod extract;
pub mod input;
pub mod postprocess;
pub mod render;
