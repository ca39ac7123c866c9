use std::path::PathBuf;
use std::sync::Arc;

use push_dispatch::drain::{DrainOutcome, Drainer, FileLock};
use push_dispatch::models::log::LogLevel;
use push_dispatch::models::notification::NotificationStatus;
use push_dispatch::store::{InMemoryStore, NotificationStore};
use uuid::Uuid;

use crate::support::{self, FailingStore, FakeSender};

fn lockfile_path() -> PathBuf {
    std::env::temp_dir().join(format!("push-dispatch-test-{}.lock", Uuid::new_v4()))
}

/// Test: the drain loop iterates until no eligible notification remains
#[tokio::test]
async fn test_run_drains_the_queue_to_empty() {
    let store = InMemoryStore::new();
    for index in 0..5 {
        store
            .insert(support::queued_draft(&format!("queued {index}")))
            .await
            .unwrap();
    }

    let mut config = support::test_config();
    config.batch_size = 2;

    let sender = FakeSender::new();
    let engine = support::engine_with(&store, sender.clone(), &config);
    let drainer = Drainer::new(engine, lockfile_path(), 1, LogLevel::Off);

    let outcome = drainer.run().await.unwrap();

    let DrainOutcome::Completed(report) = outcome else {
        panic!("expected a completed drain");
    };
    assert_eq!(report.iterations, 3);
    assert_eq!(report.sent, 5);
    assert_eq!(report.attempted(), 5);
    assert!(!store.has_due().await.unwrap());
}

/// Test: a held lock means another drain is running; nothing is touched
#[tokio::test]
async fn test_run_exits_when_lock_is_held() {
    let store = InMemoryStore::new();
    store.insert(support::queued_draft("waiting")).await.unwrap();

    let path = lockfile_path();
    let held = FileLock::acquire(&path).unwrap().unwrap();

    let sender = FakeSender::new();
    let engine = support::engine(&store, sender.clone());
    let drainer = Drainer::new(engine, path, 1, LogLevel::Off);

    let outcome = drainer.run().await.unwrap();

    assert_eq!(outcome, DrainOutcome::LockHeld);
    assert_eq!(sender.call_count(), 0);
    assert!(
        store
            .all()
            .await
            .iter()
            .all(|n| n.status == Some(NotificationStatus::Queued))
    );

    drop(held);
}

/// Test: the lock is released on completion so the next run can proceed
#[tokio::test]
async fn test_lock_is_released_after_completion() {
    let store = InMemoryStore::new();
    store.insert(support::queued_draft("first")).await.unwrap();

    let path = lockfile_path();
    let sender = FakeSender::new();
    let engine = support::engine(&store, sender.clone());
    let drainer = Drainer::new(engine, path.clone(), 1, LogLevel::Off);

    let first = drainer.run().await.unwrap();
    assert!(matches!(first, DrainOutcome::Completed(_)));
    assert!(!path.exists());

    store.insert(support::queued_draft("second")).await.unwrap();

    let second = drainer.run().await.unwrap();
    let DrainOutcome::Completed(report) = second else {
        panic!("expected a completed drain");
    };
    assert_eq!(report.sent, 1);
}

/// Test: a store failure is fatal for the run and propagates
#[tokio::test]
async fn test_store_failure_propagates() {
    let sender = FakeSender::new();
    let engine = support::engine_from(
        Arc::new(FailingStore),
        sender,
        &support::test_config(),
    );
    let drainer = Drainer::new(engine, lockfile_path(), 1, LogLevel::Off);

    let result = drainer.run().await;

    assert!(result.is_err());
}
