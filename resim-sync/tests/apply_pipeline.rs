mod common;

use common::FakeBackend;
use resim_core::types::{Experience, SyncConfig, TestSuiteConfig};
use resim_sync::pipeline::{self, SyncOptions};
use resim_sync::{PlanError, Quiet, SyncError, EXIT_APPLY_FAILED, EXIT_CANCELLED, EXIT_REJECTED};
use tokio_util::sync::CancellationToken;

fn located(name: &str) -> Experience {
    Experience::named(name).with_locations([format!("s3://bucket/{name}")])
}

fn config(experiences: Vec<Experience>) -> SyncConfig {
    SyncConfig {
        experiences,
        ..SyncConfig::default()
    }
}

fn suite(name: &str, members: &[&str]) -> TestSuiteConfig {
    TestSuiteConfig {
        name: name.to_string(),
        experiences: members.iter().map(|m| m.to_string()).collect(),
    }
}

async fn sync(backend: &FakeBackend, config: &SyncConfig) -> Result<resim_sync::SyncReport, SyncError> {
    pipeline::sync_config(backend, config, &SyncOptions::default(), &Quiet).await
}

// ---------------------------------------------------------------------------
// Single-operation scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn creates_one_experience_from_empty_state() {
    let backend = FakeBackend::new();
    let mut a = located("A");
    a.description = "d".to_string();

    let report = sync(&backend, &config(vec![a])).await.expect("sync");

    assert_eq!(report.summary.creates, 1);
    assert_eq!(backend.mutating_calls(), vec!["create_experience"]);
    let stored = backend.experience("A").expect("created");
    assert_eq!(stored.description, "d");
    assert!(!stored.archived);
}

#[tokio::test]
async fn archives_experience_missing_from_config() {
    let backend = FakeBackend::new();
    backend.seed_experience(located("A"));

    let report = sync(&backend, &config(vec![])).await.expect("sync");

    assert_eq!(report.summary.archives, 1);
    assert_eq!(backend.mutating_calls(), vec!["archive_experiences"]);
    assert!(backend.experience("A").expect("kept").archived);
}

#[tokio::test]
async fn renames_by_id_and_revises_suite_afterwards() {
    let backend = FakeBackend::new();
    let id = backend.seed_experience(located("old-name"));
    backend.seed_suite("S");

    let mut cfg = config(vec![located("new-name").with_id(id)]);
    cfg.managed_test_suites = vec![suite("S", &["new-name"])];
    sync(&backend, &cfg).await.expect("sync");

    assert_eq!(
        backend.mutating_calls(),
        vec!["update_experience", "revise_test_suite"]
    );
    assert!(backend.experience("old-name").is_none());
    assert_eq!(backend.experience("new-name").and_then(|e| e.experience_id), Some(id));
    assert_eq!(backend.suite("S"), (1, vec!["new-name".to_string()]));
}

#[tokio::test]
async fn restores_archived_experience_before_updating() {
    let backend = FakeBackend::new();
    backend.seed_experience(located("A").archived());

    sync(&backend, &config(vec![located("A")])).await.expect("sync");

    assert_eq!(
        backend.mutating_calls(),
        vec!["restore_experience", "update_experience"]
    );
    assert!(!backend.experience("A").expect("kept").archived);
}

#[tokio::test]
async fn unchanged_experience_issues_no_update() {
    let backend = FakeBackend::new();
    backend.seed_experience(located("A"));

    let report = sync(&backend, &config(vec![located("A")])).await.expect("sync");

    assert_eq!(report.summary.unchanged, 1);
    assert!(backend.mutating_calls().is_empty());
}

// ---------------------------------------------------------------------------
// Ordering, id back-fill, idempotence
// ---------------------------------------------------------------------------

/// A backend and config exercising every phase.
fn busy_fixture() -> (FakeBackend, SyncConfig) {
    let backend = FakeBackend::new();
    let keep = backend.seed_experience(located("keep"));
    let stale = backend.seed_experience(located("stale"));
    backend.seed_experience(located("revive").archived());
    let untag = backend.seed_experience(located("untag"));
    backend.seed_tag("regression", &[keep, untag]);
    backend.seed_tag("nightly", &[stale]);
    backend.seed_system("planner", &[]);
    backend.seed_suite("smoke");

    let mut changed = located("keep").with_tags(["regression"]);
    changed.description = "updated".to_string();
    let mut cfg = config(vec![
        changed,
        located("fresh").with_tags(["regression", "nightly"]).with_systems(["planner"]),
        located("revive"),
        located("untag"),
    ]);
    cfg.managed_experience_tags.insert("regression".to_string());
    cfg.managed_test_suites = vec![suite("smoke", &["fresh", "keep"])];
    (backend, cfg)
}

fn position_of(calls: &[&str], groups: &[&str]) -> (usize, usize) {
    let positions: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, op)| groups.contains(*op))
        .map(|(i, _)| i)
        .collect();
    (
        *positions.first().expect("group present"),
        *positions.last().expect("group present"),
    )
}

#[tokio::test]
async fn phases_run_in_order() {
    let (backend, cfg) = busy_fixture();
    sync(&backend, &cfg).await.expect("sync");

    let calls = backend.mutating_calls();
    let experiences = position_of(
        &calls,
        &["create_experience", "update_experience", "restore_experience"],
    );
    let suites = position_of(&calls, &["revise_test_suite"]);
    let memberships = position_of(
        &calls,
        &[
            "add_tags_to_experiences",
            "remove_tag_from_experience",
            "add_systems_to_experiences",
        ],
    );
    let archive = position_of(&calls, &["archive_experiences"]);

    assert!(experiences.1 < suites.0, "{calls:?}");
    assert!(suites.1 < memberships.0, "{calls:?}");
    assert!(memberships.1 < archive.0, "{calls:?}");
}

#[tokio::test]
async fn created_ids_reach_tags_systems_and_suites() {
    let (backend, cfg) = busy_fixture();
    sync(&backend, &cfg).await.expect("sync");

    assert!(backend.tag_members("regression").contains("fresh"));
    assert!(backend.tag_members("nightly").contains("fresh"));
    assert!(backend.system_members("planner").contains("fresh"));
    assert_eq!(
        backend.suite("smoke"),
        (1, vec!["fresh".to_string(), "keep".to_string()])
    );
    // Managed tag pruned, unmanaged tag untouched.
    assert!(!backend.tag_members("regression").contains("untag"));
    assert!(backend.tag_members("nightly").contains("stale"));
    assert!(backend.experience("stale").expect("kept").archived);
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let (backend, cfg) = busy_fixture();
    sync(&backend, &cfg).await.expect("first sync");
    let before = backend.mutating_calls().len();

    let report = sync(&backend, &cfg).await.expect("second sync");

    let s = report.summary;
    assert_eq!(
        (s.creates, s.updates, s.restores, s.archives),
        (0, 0, 0, 0),
        "{s:?}"
    );
    assert_eq!((s.tag_additions, s.tag_removals, s.system_additions), (0, 0, 0));
    // Only the suite revision repeats.
    let calls = backend.mutating_calls();
    assert_eq!(&calls[before..], ["revise_test_suite"]);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn planner_rejection_performs_no_mutation() {
    let backend = FakeBackend::new();
    let id = backend.seed_experience(located("X"));
    let cfg = config(vec![located("X"), located("Y").with_id(id)]);

    let err = sync(&backend, &cfg).await.unwrap_err();

    assert!(matches!(
        &err,
        SyncError::Plan(PlanError::AmbiguousRename(name)) if name == "X"
    ));
    assert_eq!(err.exit_code(), EXIT_REJECTED);
    assert!(backend.mutating_calls().is_empty());
}

#[tokio::test]
async fn failed_create_reports_dependents_and_continues() {
    let backend = FakeBackend::new();
    backend.seed_tag("nightly", &[]);
    backend.seed_system("planner", &[]);
    backend.seed_suite("smoke");
    backend.seed_experience(located("old"));
    backend.fail("create_experience", Some("broken"));

    let mut cfg = config(vec![
        located("broken").with_tags(["nightly"]).with_systems(["planner"]),
        located("fine").with_tags(["nightly"]).with_systems(["planner"]),
    ]);
    cfg.managed_test_suites = vec![suite("smoke", &["fine", "broken"])];
    let err = sync(&backend, &cfg).await.unwrap_err();

    match &err {
        SyncError::Apply { first, failed } => {
            assert_eq!(first.operation, "create_experience");
            assert_eq!(first.entity, "broken");
            assert_eq!(first.http_status, Some(500));
            // The create, the suite revision, and the unresolved tag and
            // system additions.
            assert_eq!(*failed, 4);
        }
        other => panic!("expected apply error, got {other:?}"),
    }
    assert_eq!(err.exit_code(), EXIT_APPLY_FAILED);

    // Siblings of the failed create still get their memberships.
    assert!(backend.experience("fine").is_some());
    assert!(backend.tag_members("nightly").contains("fine"));
    assert!(backend.system_members("planner").contains("fine"));
    assert!(!backend.tag_members("nightly").contains("broken"));
    assert_eq!(backend.count("add_tags_to_experiences"), 1);
    assert_eq!(backend.count("add_systems_to_experiences"), 1);
    // A suite revision needs every member, so it is skipped.
    assert_eq!(backend.count("revise_test_suite"), 0);
    assert_eq!(backend.suite("smoke").0, 0);
    assert!(backend.experience("old").expect("kept").archived);
}

#[tokio::test]
async fn cancellation_stops_after_completed_items() {
    let backend = FakeBackend::new();
    let cancel = CancellationToken::new();
    backend.cancel_after(2, cancel.clone());
    backend.seed_suite("S");

    let names = ["a", "b", "c", "d", "e"];
    let mut cfg = config(names.iter().map(|n| located(n)).collect());
    cfg.managed_test_suites = vec![suite("S", &names)];
    let options = SyncOptions { workers: 1, cancel };

    let err = pipeline::sync_config(&backend, &cfg, &options, &Quiet)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Cancelled { completed: 2 }), "{err:?}");
    assert_eq!(err.exit_code(), EXIT_CANCELLED);
    assert_eq!(backend.experience_count(), 2);
    assert_eq!(backend.mutating_calls(), vec!["create_experience", "create_experience"]);
}

// ---------------------------------------------------------------------------
// File entry points
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_config_file_never_reaches_the_backend() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("experiences.yaml");
    std::fs::write(&path, "experiences:\n  - name: a\n    colour: blue\n").expect("write");
    let backend = FakeBackend::new();

    let err = pipeline::run(&backend, &path, &SyncOptions::default(), &Quiet)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Config(_)), "{err:?}");
    assert_eq!(err.exit_code(), EXIT_REJECTED);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn clone_writes_a_config_that_syncs_cleanly() {
    let backend = FakeBackend::new();
    let a = backend.seed_experience(located("a"));
    backend.seed_experience(located("b"));
    backend.seed_experience(located("gone").archived());
    backend.seed_tag("nightly", &[a]);

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cloned.yaml");
    let cloned = pipeline::clone(&backend, &path, &SyncOptions::default(), &Quiet)
        .await
        .expect("clone");
    assert_eq!(cloned.experiences.len(), 2);
    assert!(backend.mutating_calls().is_empty());

    let report = pipeline::run(&backend, &path, &SyncOptions::default(), &Quiet)
        .await
        .expect("sync cloned");
    let s = report.summary;
    assert_eq!((s.creates, s.updates, s.archives, s.tag_additions), (0, 0, 0, 0));
    assert!(backend.mutating_calls().is_empty());
}
