//! Integration tests for brand matching: the pure engine and match runs
//! against the in-memory store.

use tokio_test::assert_ok;
use trademark_scan::store::{DetectionStore, JobStore, MatchStore, MemoryStore};
use trademark_scan::{
    match_brands, run_matching, DetectedBrand, JobStatus, JobUpdate, LibraryBrand, MatchContext,
    MatchError, MatchType, NewScanJob, TrademarkRecord, DEFAULT_THRESHOLD,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn library(names: &[&str]) -> Vec<LibraryBrand> {
    names.iter().map(|n| LibraryBrand::new(*n)).collect()
}

fn detected(job_id: &str, names: &[&str]) -> Vec<DetectedBrand> {
    names
        .iter()
        .enumerate()
        .map(|(i, n)| {
            DetectedBrand::from_record(
                job_id,
                i + 1,
                TrademarkRecord {
                    brand_name: n.to_string(),
                    ..Default::default()
                },
                None,
            )
        })
        .collect()
}

fn ctx(store: &MemoryStore) -> MatchContext<'_> {
    MatchContext {
        jobs: store,
        library: store,
        detections: store,
        matches: store,
    }
}

async fn seeded(library_names: &[&str], detected_names: &[&str]) -> (MemoryStore, String) {
    let store = MemoryStore::new();
    let job = store
        .create(NewScanJob {
            filename: "bulletin.pdf".into(),
            storage_ref: "bulletin.pdf".into(),
        })
        .await
        .unwrap();
    store
        .update(&job.id, JobUpdate::status(JobStatus::Processing))
        .await
        .unwrap();
    store
        .update(&job.id, JobUpdate::status(JobStatus::Completed))
        .await
        .unwrap();
    store.add_library_brands(library(library_names)).await;
    for d in detected(&job.id, detected_names) {
        store.insert(d).await.unwrap();
    }
    (store, job.id)
}

// ── Engine ───────────────────────────────────────────────────────────────────

#[test]
fn test_exact_match_ignores_case_and_whitespace() {
    let lib = library(&["Nike"]);
    let det = detected("j", &["  NIKE "]);
    let results = match_brands(&lib, &det, DEFAULT_THRESHOLD).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].similarity, 100);
    assert_eq!(results[0].match_type, MatchType::Exact);
    assert_eq!(results[0].library_brand_name, "Nike");
    assert_eq!(results[0].detected_brand_name, "NIKE");
}

#[test]
fn test_fuzzy_match_one_typo() {
    let lib = library(&["Adidas"]);
    let det = detected("j", &["Addidas"]);
    let results = match_brands(&lib, &det, DEFAULT_THRESHOLD).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].similarity, 86);
    assert_eq!(results[0].match_type, MatchType::Fuzzy);
}

#[test]
fn test_empty_inputs_give_no_matches() {
    assert!(match_brands(&[], &detected("j", &["Nike"]), 0).unwrap().is_empty());
    assert!(match_brands(&library(&["Nike"]), &[], 0).unwrap().is_empty());
}

#[test]
fn test_raising_threshold_never_adds_matches() {
    let lib = library(&["Adidas", "Puma", "Reebok", "Nike"]);
    let det = detected("j", &["Addidas", "Pumma", "Rebook", "Nikey", "Zzz"]);

    let mut previous = usize::MAX;
    for threshold in (0..=100).step_by(10) {
        let results = match_brands(&lib, &det, threshold).unwrap();
        assert!(results.len() <= previous, "threshold {threshold}");
        assert!(results.iter().all(|m| m.similarity >= threshold));
        previous = results.len();
    }
}

#[test]
fn test_results_sorted_by_similarity() {
    let lib = library(&["Adidas", "Nike", "Puma"]);
    let det = detected("j", &["Pumaa", "Nike", "Addidas"]);
    let results = match_brands(&lib, &det, 50).unwrap();

    let scores: Vec<u8> = results.iter().map(|m| m.similarity).collect();
    let mut sorted = scores.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(scores, sorted);
    assert_eq!(results[0].detected_brand_name, "Nike");
}

#[test]
fn test_threshold_above_100_rejected() {
    let err = match_brands(&library(&["Nike"]), &detected("j", &["Nike"]), 150).unwrap_err();
    assert!(matches!(err, MatchError::InvalidThreshold(150)));
}

// ── Match runs ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_run_matching_persists_results() {
    let (store, job_id) = seeded(&["Nike", "Adidas"], &["Nike", "Addidas", "Unrelated"]).await;

    let results = assert_ok!(run_matching(&ctx(&store), &job_id, DEFAULT_THRESHOLD).await);
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|m| m.job_id == job_id));

    let stored = MatchStore::list_for_job(&store, &job_id).await.unwrap();
    assert_eq!(stored, results);
}

#[tokio::test]
async fn test_rerun_replaces_previous_results() {
    let (store, job_id) = seeded(&["Nike", "Adidas"], &["Nike", "Addidas"]).await;

    assert_ok!(run_matching(&ctx(&store), &job_id, 0).await);
    assert_ok!(run_matching(&ctx(&store), &job_id, 0).await);
    assert_eq!(MatchStore::list_for_job(&store, &job_id).await.unwrap().len(), 2);

    // A stricter threshold drops the fuzzy row, and the stored set follows.
    let results = assert_ok!(run_matching(&ctx(&store), &job_id, 90).await);
    assert_eq!(results.len(), 1);
    let stored = MatchStore::list_for_job(&store, &job_id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].match_type, MatchType::Exact);
}

#[tokio::test]
async fn test_empty_result_still_clears_previous_rows() {
    let (store, job_id) = seeded(&["Adidas"], &["Addidas"]).await;
    let first = assert_ok!(run_matching(&ctx(&store), &job_id, 0).await);
    assert_eq!(first.len(), 1);

    let second = assert_ok!(run_matching(&ctx(&store), &job_id, 95).await);
    assert!(second.is_empty());
    assert!(MatchStore::list_for_job(&store, &job_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_library_gives_no_matches() {
    let (store, job_id) = seeded(&[], &["Nike", "Puma"]).await;
    let results = assert_ok!(run_matching(&ctx(&store), &job_id, 0).await);
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_run_matching_scoped_to_job() {
    let (store, job_a) = seeded(&["Nike"], &["Nike"]).await;
    let job_b = store
        .create(NewScanJob {
            filename: "other.pdf".into(),
            storage_ref: "other.pdf".into(),
        })
        .await
        .unwrap();
    for d in detected(&job_b.id, &["Nike"]) {
        store.insert(d).await.unwrap();
    }

    assert_ok!(run_matching(&ctx(&store), &job_a, DEFAULT_THRESHOLD).await);
    assert_ok!(run_matching(&ctx(&store), &job_b.id, DEFAULT_THRESHOLD).await);
    // Re-running job A must not touch job B's rows.
    assert_ok!(run_matching(&ctx(&store), &job_a, DEFAULT_THRESHOLD).await);

    assert_eq!(MatchStore::list_for_job(&store, &job_a).await.unwrap().len(), 1);
    assert_eq!(MatchStore::list_for_job(&store, &job_b.id).await.unwrap().len(), 1);
    assert_eq!(DetectionStore::list_for_job(&store, &job_a).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_job_is_rejected() {
    let store = MemoryStore::new();
    let err = run_matching(&ctx(&store), "missing", DEFAULT_THRESHOLD)
        .await
        .unwrap_err();
    assert!(matches!(err, MatchError::JobNotFound { .. }));
}

#[tokio::test]
async fn test_invalid_threshold_keeps_previous_results() {
    let (store, job_id) = seeded(&["Nike"], &["Nike"]).await;
    assert_ok!(run_matching(&ctx(&store), &job_id, DEFAULT_THRESHOLD).await);

    let err = run_matching(&ctx(&store), &job_id, 101).await.unwrap_err();
    assert!(matches!(err, MatchError::InvalidThreshold(101)));
    assert_eq!(MatchStore::list_for_job(&store, &job_id).await.unwrap().len(), 1);
}
