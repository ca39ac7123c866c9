use chrono::{Duration, Utc};
use push_dispatch::cleanup::cleanup_notifications;
use push_dispatch::models::log::NewDeliveryLog;
use push_dispatch::store::{InMemoryStore, NotificationStore};

use crate::support;

/// Test: cleanup deletes notifications older than the cutoff, cascades to
/// their logs, and reports the count
#[tokio::test]
async fn test_cleanup_deletes_expired_notifications_and_logs() {
    let store = InMemoryStore::new();

    let mut old_ids = Vec::new();
    for index in 0..3 {
        let mut notification = support::raw_notification(&format!("old {index}"));
        notification.created = Utc::now() - Duration::days(100);
        old_ids.push(notification.id);
        store.insert_raw(notification).await;
    }

    let mut new_ids = Vec::new();
    for index in 0..2 {
        let notification = support::raw_notification(&format!("new {index}"));
        new_ids.push(notification.id);
        store.insert_raw(notification).await;
    }

    store
        .append_logs(vec![
            NewDeliveryLog::sent(old_ids[0]),
            NewDeliveryLog::failed(old_ids[1], "BackendError", "boom"),
            NewDeliveryLog::sent(new_ids[0]),
        ])
        .await
        .unwrap();

    let deleted = cleanup_notifications(&store, 90).await.unwrap();

    assert_eq!(deleted, 3);

    let remaining = store.all().await;
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|n| new_ids.contains(&n.id)));

    let remaining_logs = store.all_logs().await;
    assert_eq!(remaining_logs.len(), 1);
    assert_eq!(remaining_logs[0].notification_id, new_ids[0]);
}

/// Test: nothing newer than the cutoff is touched
#[tokio::test]
async fn test_cleanup_with_nothing_expired() {
    let store = InMemoryStore::new();
    store.insert_raw(support::raw_notification("fresh")).await;

    let deleted = cleanup_notifications(&store, 90).await.unwrap();

    assert_eq!(deleted, 0);
    assert_eq!(store.all().await.len(), 1);
}
