//! # Network Builder Integration Tests
//!
//! Runs the builder service end to end against the in-memory source and
//! store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use mlm_network::{
    Financials, NetworkBuilderApi, NetworkBuilderService, NetworkConfig, NetworkStore,
    MemoryNetworkStore, MemoryReferralSource, NetworkError, ReferralSource, SyncStatus, SyncType,
};
use rust_decimal::Decimal;

fn service(
    source: &Arc<MemoryReferralSource>,
    store: &Arc<MemoryNetworkStore>,
) -> NetworkBuilderService {
    NetworkBuilderService::new(
        NetworkConfig::for_testing(),
        Arc::clone(source) as Arc<dyn ReferralSource>,
        Arc::clone(store) as Arc<dyn NetworkStore>,
    )
    .expect("valid config")
}

#[tokio::test]
async fn test_batch_continues_past_failing_affiliate() {
    // Arrange: three affiliates, the second one's source query fails
    let source = Arc::new(MemoryReferralSource::from_edges(&[
        ("A1", "c1"),
        ("A2", "c2"),
        ("A3", "c3"),
    ]));
    source.fail_on("A2");
    let store = Arc::new(MemoryNetworkStore::new());
    let a1 = store.insert_affiliate("A1");
    let a2 = store.insert_affiliate("A2");
    let a3 = store.insert_affiliate("A3");
    let svc = service(&source, &store);

    // Act
    let report = svc.rebuild_all().await.unwrap();

    // Assert
    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.total, 3);

    let run = store.load_sync_run(SyncType::MlmNetwork).await.unwrap();
    assert_eq!(run.status(), SyncStatus::Completed);
    assert_eq!(run.records_processed(), 2);
    assert_eq!(run.total_records(), 3);
    assert!(run.error_message().is_none());

    assert_eq!(store.network(a1).len(), 1);
    assert!(store.network(a2).is_empty());
    assert!(store.stats(a2).is_none());
    assert_eq!(store.network(a3).len(), 1);
}

#[tokio::test]
async fn test_cycle_scenario() {
    let source = Arc::new(MemoryReferralSource::from_edges(&[
        ("A", "B"),
        ("B", "C"),
        ("C", "A"),
    ]));
    let store = Arc::new(MemoryNetworkStore::new());
    let a = store.insert_affiliate("A");
    let svc = service(&source, &store);

    svc.rebuild_all().await.unwrap();

    let entries = store.network(a);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].client_id.as_str(), "B");
    assert_eq!(entries[0].level, 1);
    assert_eq!(entries[1].client_id.as_str(), "C");
    assert_eq!(entries[1].level, 2);
    let path: Vec<&str> = entries[1].path.iter().map(|p| p.as_str()).collect();
    assert_eq!(path, vec!["A", "B"]);

    let stats = store.stats(a).unwrap();
    assert_eq!(stats.count_at(1), 1);
    assert_eq!(stats.count_at(2), 1);
    assert_eq!(stats.count_at(3), 0);
    assert_eq!(stats.total_network_size, 2);
}

#[tokio::test]
async fn test_zero_referral_affiliate_gets_empty_stats() {
    let source = Arc::new(MemoryReferralSource::from_edges(&[("A", "B")]));
    let store = Arc::new(MemoryNetworkStore::new());
    let x = store.insert_affiliate("X");
    let svc = service(&source, &store);

    let report = svc.rebuild_all().await.unwrap();

    assert_eq!(report.processed, 1);
    assert!(store.network(x).is_empty());
    let stats = store.stats(x).unwrap();
    assert_eq!(stats.total_network_size, 0);
    assert!(stats.levels.iter().all(|l| l.count == 0));
}

#[tokio::test]
async fn test_double_rebuild_is_idempotent() {
    let source = Arc::new(MemoryReferralSource::from_edges(&[
        ("R", "a"),
        ("R", "b"),
        ("a", "c"),
        ("b", "c"),
        ("c", "d"),
    ]));
    let store = Arc::new(MemoryNetworkStore::new());
    let r = store.insert_affiliate("R");
    let svc = service(&source, &store);

    svc.rebuild_all().await.unwrap();
    let first_entries = store.network(r);
    let first_stats = store.stats(r);

    svc.rebuild_all().await.unwrap();

    assert_eq!(store.network(r), first_entries);
    assert_eq!(store.stats(r), first_stats);
    assert_eq!(store.stats_rows(), 1);
}

#[tokio::test]
async fn test_mid_write_failure_keeps_previous_network() {
    // Arrange: a committed network of two entries
    let source = Arc::new(MemoryReferralSource::from_edges(&[("R", "a"), ("a", "b")]));
    let store = Arc::new(MemoryNetworkStore::new());
    let r = store.insert_affiliate("R");
    let svc = service(&source, &store);
    let affiliate = store.affiliates().remove(0);
    svc.process_affiliate(&affiliate).await.unwrap();
    let before_entries = store.network(r);
    let before_stats = store.stats(r);

    // Act: the network grows, but the write fails after one insert
    source.add_edge("R", "z");
    store.fail_after_inserts(Some(1));
    let err = svc.process_affiliate(&affiliate).await.unwrap_err();

    // Assert: neither entries nor stats moved
    assert!(matches!(err, NetworkError::Storage(_)));
    assert_eq!(store.network(r), before_entries);
    assert_eq!(store.stats(r), before_stats);

    store.fail_after_inserts(None);
    svc.process_affiliate(&affiliate).await.unwrap();
    assert_eq!(store.network(r).len(), 3);
}

#[tokio::test]
async fn test_financials_flow_into_stats() {
    let source = Arc::new(MemoryReferralSource::from_edges(&[("R", "a"), ("a", "b")]));
    let store = Arc::new(MemoryNetworkStore::new());
    let r = store.insert_affiliate("R");
    store.set_financials(
        "b",
        Financials {
            deposits: Decimal::new(5000, 2),
            rev: Decimal::new(125, 2),
            ..Financials::default()
        },
    );
    let svc = service(&source, &store);

    svc.rebuild_all().await.unwrap();

    let stats = store.stats(r).unwrap();
    assert!(stats.financials_at(1).is_zero());
    assert_eq!(stats.financials_at(2).deposits, Decimal::new(5000, 2));
    assert_eq!(stats.financials_at(2).rev, Decimal::new(125, 2));
}

#[tokio::test]
async fn test_incremental_without_watermark_support_rescans_all() {
    let source = Arc::new(MemoryReferralSource::from_edges(&[
        ("A", "x"),
        ("B", "y"),
        ("Unknown", "z"),
    ]));
    let store = Arc::new(MemoryNetworkStore::new());
    let a = store.insert_affiliate("A");
    let b = store.insert_affiliate("B");
    let svc = service(&source, &store);

    let report = svc.incremental_sync().await.unwrap();

    // Sponsors without an affiliate row are skipped, not failed
    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.total, 3);
    assert_eq!(store.network(a).len(), 1);
    assert_eq!(store.network(b).len(), 1);

    let run = store.load_sync_run(SyncType::Incremental).await.unwrap();
    assert_eq!(run.status(), SyncStatus::Completed);
    assert_eq!(run.last_sync(), run.started_at());
}

#[tokio::test]
async fn test_incremental_honours_watermark() {
    let source = Arc::new(MemoryReferralSource::from_edges(&[("A", "x"), ("B", "y")]));
    let store = Arc::new(MemoryNetworkStore::new());
    let a = store.insert_affiliate("A");
    let b = store.insert_affiliate("B");
    let svc = service(&source, &store);

    // Both sponsors changed long ago; the first run has no watermark yet
    let long_ago = Utc::now() - Duration::days(1);
    source.touch("A", long_ago);
    source.touch("B", long_ago);
    let first = svc.incremental_sync().await.unwrap();
    assert_eq!(first.processed, 2);

    // Only A changes after the recorded watermark
    source.add_edge("A", "x2");
    source.add_edge("B", "y2");
    source.touch("A", Utc::now() + Duration::seconds(1));
    let second = svc.incremental_sync().await.unwrap();

    assert_eq!(second.processed, 1);
    assert_eq!(second.total, 1);
    assert_eq!(store.network(a).len(), 2);
    assert_eq!(store.network(b).len(), 1);
}

#[tokio::test]
async fn test_incremental_source_failure_marks_error_and_keeps_watermark() {
    let source = Arc::new(MemoryReferralSource::from_edges(&[("A", "x")]));
    let store = Arc::new(MemoryNetworkStore::new());
    store.insert_affiliate("A");
    let svc = service(&source, &store);

    svc.incremental_sync().await.unwrap();
    let watermark = store
        .load_sync_run(SyncType::Incremental)
        .await
        .unwrap()
        .last_sync();

    source.set_fail_all(true);
    assert!(svc.incremental_sync().await.is_err());

    let run = store.load_sync_run(SyncType::Incremental).await.unwrap();
    assert_eq!(run.status(), SyncStatus::Error);
    assert_eq!(run.last_sync(), watermark);
}
