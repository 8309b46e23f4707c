//! Name canonicalisation.

/// Canonical comparison key for a brand name: trimmed and lowercased.
///
/// Applied identically to detected and library names. Whitespace-only input
/// yields an empty key, which the engine never matches.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}
