//! Edit-distance similarity.
//!
//! Lengths and distances are counted in Unicode scalar values, the same unit
//! `strsim::levenshtein` works in, so accented brand names score the same as
//! their ASCII-only peers.

/// Similarity of `a` and `b` as an integer percentage.
///
/// `round(100 * (max_len - d) / max_len)` where `d` is the Levenshtein
/// distance between the lowercase forms. Two empty strings score 100; the
/// engine never reaches that case because empty names are filtered first.
pub fn similarity(a: &str, b: &str) -> u8 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 100;
    }
    let distance = strsim::levenshtein(&a, &b);
    let score = 100.0 * (max_len - distance) as f64 / max_len as f64;
    score.round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_100() {
        assert_eq!(similarity("adidas", "adidas"), 100);
        assert_eq!(similarity("Adidas", "ADIDAS"), 100);
    }

    #[test]
    fn one_insertion_over_seven_chars() {
        // "adidas" → "addidas": d = 1, max_len = 7 → round(600 / 7) = 86
        assert_eq!(similarity("adidas", "addidas"), 86);
    }

    #[test]
    fn disjoint_strings_score_0() {
        assert_eq!(similarity("abc", "xyz"), 0);
        assert_eq!(similarity("", "xyz"), 0);
    }

    #[test]
    fn both_empty_is_degenerate_agreement() {
        assert_eq!(similarity("", ""), 100);
    }

    #[test]
    fn symmetric() {
        let pairs = [
            ("nike", "nikee"),
            ("puma", "pumas"),
            ("", "x"),
            ("Zara", "zar"),
            ("müller", "mueller"),
        ];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a), "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn counts_chars_not_bytes() {
        // one substitution over six characters
        assert_eq!(similarity("nestlé", "nestle"), 83);
    }
}
