//! Matching engine: best library match per detected brand.
//!
//! Cost is O(N·M) comparisons, each O(L²) in name length. That is fine for
//! libraries in the low thousands. A trigram index could replace the fuzzy
//! scan later as long as "exact short-circuits fuzzy" and "best candidate at
//! or above threshold" still hold.

use crate::error::MatchError;
use crate::matching::similarity;
use crate::model::{DetectedBrand, LibraryBrand, MatchResult, MatchType};
use std::collections::HashMap;
use tracing::debug;

/// Default minimum fuzzy score.
pub const DEFAULT_THRESHOLD: u8 = 70;

/// Reconcile `detected` against `library`.
///
/// - Exact hit on the normalised name → similarity 100, `exact`, fuzzy skipped.
/// - Otherwise the highest-scoring library entry, if it reaches `threshold`,
///   becomes a `fuzzy` match. On equal scores the earlier library entry wins.
/// - Detected entries with an empty normalised name produce nothing.
/// - Duplicate normalised names in the library: the last one wins the exact
///   lookup.
///
/// The output is sorted by similarity, descending; ties keep emission order.
pub fn match_brands(
    library: &[LibraryBrand],
    detected: &[DetectedBrand],
    threshold: u8,
) -> Result<Vec<MatchResult>, MatchError> {
    if threshold > 100 {
        return Err(MatchError::InvalidThreshold(threshold));
    }

    let exact: HashMap<&str, &LibraryBrand> = library
        .iter()
        .filter(|b| !b.normalized_name.is_empty())
        .map(|b| (b.normalized_name.as_str(), b))
        .collect();

    let mut matches = Vec::new();

    for brand in detected {
        let key = brand.normalized_name.as_str();
        if key.is_empty() {
            continue;
        }

        if let Some(hit) = exact.get(key) {
            matches.push(to_result(brand, hit, 100, MatchType::Exact));
            continue;
        }

        if let Some((score, candidate)) = best_candidate(key, library) {
            if score >= threshold {
                matches.push(to_result(brand, candidate, score, MatchType::Fuzzy));
            } else {
                debug!(
                    "No match for '{}': best '{}' scored {} < {}",
                    brand.name, candidate.name, score, threshold
                );
            }
        }
    }

    matches.sort_by(|a, b| b.similarity.cmp(&a.similarity));
    Ok(matches)
}

/// Highest-scoring library entry for `key`. First seen wins on ties.
fn best_candidate<'a>(key: &str, library: &'a [LibraryBrand]) -> Option<(u8, &'a LibraryBrand)> {
    let mut best: Option<(u8, &LibraryBrand)> = None;
    for candidate in library.iter().filter(|b| !b.normalized_name.is_empty()) {
        let score = similarity(key, &candidate.normalized_name);
        match best {
            Some((top, _)) if score <= top => {}
            _ => best = Some((score, candidate)),
        }
    }
    best
}

fn to_result(
    detected: &DetectedBrand,
    library: &LibraryBrand,
    similarity: u8,
    match_type: MatchType,
) -> MatchResult {
    MatchResult {
        job_id: detected.job_id.clone(),
        library_brand_id: library.id.clone(),
        library_brand_name: library.name.clone(),
        detected_brand_id: detected.id.clone(),
        detected_brand_name: detected.name.clone(),
        similarity,
        match_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::normalize;
    use std::collections::BTreeSet;

    fn lib(id: &str, name: &str) -> LibraryBrand {
        LibraryBrand {
            id: id.into(),
            name: name.into(),
            normalized_name: normalize(name),
            ..Default::default()
        }
    }

    fn det(id: &str, name: &str) -> DetectedBrand {
        DetectedBrand {
            id: id.into(),
            job_id: "job".into(),
            name: name.into(),
            normalized_name: normalize(name),
            source_pages: BTreeSet::from([1]),
            logo_reference: None,
            nice_classes: vec![],
            application_number: None,
            filing_date: None,
            expiry_date: None,
            owner: None,
            colors: None,
            description: None,
        }
    }

    #[test]
    fn exact_short_circuits_fuzzy() {
        // "nikes" would also score well against "nike", but the exact hit wins.
        let library = vec![lib("1", "Nikes"), lib("2", "Nike")];
        let out = match_brands(&library, &[det("d", "NIKE")], 70).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].library_brand_id, "2");
        assert_eq!(out[0].match_type, MatchType::Exact);
        assert_eq!(out[0].similarity, 100);
    }

    #[test]
    fn duplicate_library_keys_last_writer_wins() {
        let library = vec![lib("first", "Puma"), lib("second", "PUMA ")];
        let out = match_brands(&library, &[det("d", "puma")], 70).unwrap();
        assert_eq!(out[0].library_brand_id, "second");
    }

    #[test]
    fn fuzzy_tie_keeps_first_library_entry() {
        // "zarb" and "zarc" are both one substitution away from "zara".
        let library = vec![lib("b", "Zarb"), lib("c", "Zarc")];
        let out = match_brands(&library, &[det("d", "Zara")], 70).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].library_brand_id, "b");
        assert_eq!(out[0].match_type, MatchType::Fuzzy);
        assert_eq!(out[0].similarity, 75);
    }

    #[test]
    fn below_threshold_is_omitted() {
        let library = vec![lib("1", "Samsung")];
        let out = match_brands(&library, &[det("d", "Sony")], 70).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn empty_names_never_match() {
        let library = vec![lib("1", ""), lib("2", "Apple")];
        let out = match_brands(&library, &[det("d", "   ")], 0).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn empty_library_entry_is_not_a_candidate() {
        let library = vec![lib("blank", "  ")];
        let out = match_brands(&library, &[det("d", "x")], 0).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn output_sorted_descending_and_stable() {
        let library = vec![lib("1", "Adidas"), lib("2", "Nike"), lib("3", "Reebok")];
        let detected = vec![
            det("a", "Addidas"), // 86
            det("b", "Nike"),    // 100
            det("c", "Reebock"), // 86
        ];
        let out = match_brands(&library, &detected, 70).unwrap();
        let order: Vec<&str> = out.iter().map(|m| m.detected_brand_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn threshold_above_100_is_rejected() {
        let err = match_brands(&[], &[], 101).unwrap_err();
        assert!(matches!(err, MatchError::InvalidThreshold(101)));
    }

    #[test]
    fn result_carries_job_and_ids() {
        let library = vec![lib("lib-1", "Adidas")];
        let out = match_brands(&library, &[det("det-1", "Addidas")], 70).unwrap();
        assert_eq!(out[0].job_id, "job");
        assert_eq!(out[0].detected_brand_id, "det-1");
        assert_eq!(out[0].detected_brand_name, "Addidas");
        assert_eq!(out[0].library_brand_name, "Adidas");
    }
}
