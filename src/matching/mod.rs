//! Brand reconciliation: detected names vs. the user's brand library.
//!
//! ```text
//! raw name ──▶ normalize ──▶ exact lookup ──hit──▶ MatchResult (100, exact)
//!                                 │
//!                                miss
//!                                 ▼
//!                      similarity vs. every entry ──best ≥ threshold──▶ MatchResult (fuzzy)
//! ```
//!
//! 1. [`normalize`]  — canonical comparison key, shared by both sides
//! 2. [`similarity`] — Levenshtein-based score in `0..=100`
//! 3. [`engine`]     — exact short-circuit, best fuzzy candidate, ordering

pub mod engine;
pub mod normalize;
pub mod similarity;

pub use engine::{match_brands, DEFAULT_THRESHOLD};
pub use normalize::normalize;
pub use similarity::similarity;
