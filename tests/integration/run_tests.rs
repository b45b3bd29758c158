//! End-to-end runs against the mock catalog

use crate::catalog::{book_path, mount_catalog, mount_unavailable, test_config, BOOKS};
use shelfwatch::crawler::{run_crawl, run_once, RunOptions};
use shelfwatch::model::{ChangeKind, FailureKind, FieldName, FieldValue, Identity, Price, RunId};
use shelfwatch::output::{rebuild_latest_summary, DailyReport};
use shelfwatch::state::RunState;
use shelfwatch::storage::{open_storage, Storage};
use std::path::Path;
use wiremock::MockServer;

const PRICES: [&str; 3] = ["51.77", "53.74", "50.10"];

fn fresh(run_id: &str) -> RunOptions {
    RunOptions {
        run_id: Some(RunId::new(run_id)),
        resume: false,
        config_hash: "integration".to_string(),
    }
}

#[tokio::test]
async fn test_full_run_then_rerun_is_unchanged() {
    let server = MockServer::start().await;
    mount_catalog(&server, PRICES, &[]).await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server.uri(), dir.path());

    let first = run_crawl(&config, fresh("run-1")).await.unwrap();
    assert_eq!(first.state, RunState::Completed);
    assert_eq!(first.total_targets, 3);
    assert_eq!(first.counts.new, 3);
    assert!(first.failed.is_empty());
    assert!(first.changes.iter().all(|c| c.kind == ChangeKind::New));

    let markdown = std::fs::read_to_string(dir.path().join("summary.md")).unwrap();
    assert!(markdown.contains("# Shelfwatch Run Summary"));
    assert!(markdown.contains("run-1"));

    let second = run_crawl(&config, fresh("run-2")).await.unwrap();
    assert_eq!(second.state, RunState::Completed);
    assert_eq!(second.counts.unchanged, 3);
    assert!(second.changes.is_empty());

    let storage = open_storage(Path::new(&config.output.database_path)).unwrap();
    assert_eq!(storage.count_records().unwrap(), 3);
    assert_eq!(storage.count_changes_by_kind(ChangeKind::New).unwrap(), 3);
    assert_eq!(storage.count_changes_by_kind(ChangeKind::Updated).unwrap(), 0);

    let report = storage.get_report(&RunId::new("run-1")).unwrap().unwrap();
    assert_eq!(report.new_count, 3);
    let body: DailyReport = serde_json::from_str(&report.payload_json).unwrap();
    assert_eq!(body.changes.len(), 2);
    assert!(body.truncated);
}

#[tokio::test]
async fn test_price_change_is_updated() {
    let server = MockServer::start().await;
    mount_catalog(&server, PRICES, &[]).await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server.uri(), dir.path());

    let first = run_crawl(&config, fresh("run-1")).await.unwrap();
    assert_eq!(first.counts.new, 3);

    server.reset().await;
    mount_catalog(&server, ["51.77", "60.00", "50.10"], &[]).await;

    let second = run_crawl(&config, fresh("run-2")).await.unwrap();
    assert_eq!(second.state, RunState::Completed);
    assert_eq!(second.counts.updated, 1);
    assert_eq!(second.counts.unchanged, 2);

    let change = &second.changes[0];
    assert_eq!(change.identity, Identity::new(BOOKS[1]));
    assert_eq!(change.kind, ChangeKind::Updated);
    let price = change.field_change(FieldName::PriceInclTax).unwrap();
    assert_eq!(price.old, FieldValue::Money(Price::from_minor(5374)));
    assert_eq!(price.new, FieldValue::Money(Price::from_minor(6000)));
    assert!(!change.touches(FieldName::Title));

    let storage = open_storage(Path::new(&config.output.database_path)).unwrap();
    let record = storage
        .get_by_identity(&Identity::new(BOOKS[1]))
        .unwrap()
        .unwrap();
    assert_eq!(record.first_seen, first.started_at);
    assert_eq!(record.last_updated, second.started_at);
    assert_eq!(
        storage
            .changes_for_identity(&Identity::new(BOOKS[1]))
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_exhausted_retries_fail_url_and_resume_recovers() {
    let server = MockServer::start().await;
    mount_catalog(&server, PRICES, &[BOOKS[1]]).await;
    mount_unavailable(&server, BOOKS[1]).await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server.uri(), dir.path());
    let failing_url = format!("{}{}", server.uri(), book_path(BOOKS[1]));

    let first = run_crawl(&config, fresh("run-1")).await.unwrap();
    assert_eq!(first.state, RunState::CompletedWithFailures);
    assert_eq!(first.counts.new, 2);
    assert_eq!(first.failed_urls(), vec![failing_url.as_str()]);
    assert_eq!(first.failed[0].kind, FailureKind::TransientExhausted);

    let attempts = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == book_path(BOOKS[1]))
        .count();
    assert_eq!(attempts, 2);

    server.reset().await;
    mount_catalog(&server, PRICES, &[]).await;

    let resumed = run_crawl(
        &config,
        RunOptions {
            run_id: None,
            resume: true,
            config_hash: "integration".to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(resumed.run_id, RunId::new("run-1"));
    assert_eq!(resumed.state, RunState::Completed);
    assert_eq!(resumed.skipped, 2);
    assert_eq!(resumed.counts.new, 1);

    let book_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().starts_with("/catalogue/") && r.url.path().ends_with("_999/index.html"))
        .count();
    assert_eq!(book_requests, 1);

    let storage = open_storage(Path::new(&config.output.database_path)).unwrap();
    assert!(storage.done_urls(&RunId::new("run-1")).unwrap().is_empty());
    assert_eq!(storage.count_records().unwrap(), 3);

    let report = storage.get_report(&RunId::new("run-1")).unwrap().unwrap();
    assert_eq!(report.new_count, 3);

    let exported = rebuild_latest_summary(&storage).unwrap();
    assert_eq!(exported.state, RunState::Completed);
    assert_eq!(exported.counts.new, 3);
    assert_eq!(exported.changes.len(), 3);
    assert!(exported.failed.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_once_blocking_entry_point() {
    let server = MockServer::start().await;
    mount_catalog(&server, PRICES, &[]).await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server.uri(), dir.path());

    let summary = std::thread::spawn(move || run_once(&config, RunOptions::default()))
        .join()
        .unwrap()
        .unwrap();

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.counts.new, 3);
    assert!(!summary.run_id.as_str().is_empty());
}
