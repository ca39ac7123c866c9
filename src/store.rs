use std::cmp::Ordering;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    log::{DeliveryLog, NewDeliveryLog},
    notification::{NewNotification, Notification, NotificationStatus},
};

/// One key of the queue selection order, e.g. `-priority` or `created`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Priority,
    Created,
    LastUpdated,
    ScheduledTime,
}

impl SortKey {
    pub fn descending_priority() -> Self {
        Self {
            field: SortField::Priority,
            descending: true,
        }
    }

    fn compare(&self, a: &Notification, b: &Notification) -> Ordering {
        let ordering = match self.field {
            SortField::Priority => a.priority.cmp(&b.priority),
            SortField::Created => a.created.cmp(&b.created),
            SortField::LastUpdated => a.last_updated.cmp(&b.last_updated),
            SortField::ScheduledTime => a.scheduled_time.cmp(&b.scheduled_time),
        };

        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        let (name, descending) = match s.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (s, false),
        };

        let field = match name {
            "priority" => SortField::Priority,
            "created" => SortField::Created,
            "last_updated" => SortField::LastUpdated,
            "scheduled_time" => SortField::ScheduledTime,
            other => return Err(format!("unknown sending order key: {other}")),
        };

        Ok(Self { field, descending })
    }
}

impl TryFrom<String> for SortKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

/// Compares two notifications by a key list, first non-equal key wins.
pub fn compare_by_keys(keys: &[SortKey], a: &Notification, b: &Notification) -> Ordering {
    keys.iter()
        .map(|key| key.compare(a, b))
        .find(|ordering| !ordering.is_eq())
        .unwrap_or(Ordering::Equal)
}

/// Durable home of notifications and their delivery logs. The dispatch
/// engine only ever talks to the queue through this interface; status
/// updates and log inserts are set-based so a shard writes back in a
/// constant number of calls.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persists a draft, assigning id and timestamps.
    async fn insert(&self, draft: NewNotification) -> Result<Notification, StoreError>;

    /// Bulk variant of [`insert`](Self::insert), one round trip for the batch.
    async fn insert_many(
        &self,
        drafts: Vec<NewNotification>,
    ) -> Result<Vec<Notification>, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Notification>, StoreError>;

    /// Queued notifications whose scheduled time is unset or has passed,
    /// ordered by the key list and capped at `limit`.
    async fn fetch_due(
        &self,
        limit: usize,
        order: &[SortKey],
    ) -> Result<Vec<Notification>, StoreError>;

    async fn has_due(&self) -> Result<bool, StoreError>;

    /// Atomic multi-row status update; bumps `last_updated` on every row.
    async fn set_status(
        &self,
        ids: &[Uuid],
        status: NotificationStatus,
    ) -> Result<(), StoreError>;

    async fn append_logs(&self, logs: Vec<NewDeliveryLog>) -> Result<(), StoreError>;

    async fn logs_for(&self, notification_id: Uuid) -> Result<Vec<DeliveryLog>, StoreError>;

    /// Deletes notifications created before the cutoff, cascading to their
    /// logs. Returns the number of deleted notifications.
    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// In-memory store, the reference double for tests and embedded use.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    notifications: Vec<Notification>,
    logs: Vec<DeliveryLog>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully materialized notification as-is. Lets tests control
    /// identity and timestamps the trait methods assign themselves.
    pub async fn insert_raw(&self, notification: Notification) {
        self.inner.lock().await.notifications.push(notification);
    }

    pub async fn all(&self) -> Vec<Notification> {
        self.inner.lock().await.notifications.clone()
    }

    pub async fn all_logs(&self) -> Vec<DeliveryLog> {
        self.inner.lock().await.logs.clone()
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn insert(&self, draft: NewNotification) -> Result<Notification, StoreError> {
        let notification = Notification::from_draft(draft);
        self.inner
            .lock()
            .await
            .notifications
            .push(notification.clone());
        Ok(notification)
    }

    async fn insert_many(
        &self,
        drafts: Vec<NewNotification>,
    ) -> Result<Vec<Notification>, StoreError> {
        let notifications: Vec<Notification> =
            drafts.into_iter().map(Notification::from_draft).collect();
        self.inner
            .lock()
            .await
            .notifications
            .extend(notifications.clone());
        Ok(notifications)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.notifications.iter().find(|n| n.id == id).cloned())
    }

    async fn fetch_due(
        &self,
        limit: usize,
        order: &[SortKey],
    ) -> Result<Vec<Notification>, StoreError> {
        let now = Utc::now();
        let inner = self.inner.lock().await;

        let mut due: Vec<Notification> = inner
            .notifications
            .iter()
            .filter(|n| n.is_due(now))
            .cloned()
            .collect();
        due.sort_by(|a, b| compare_by_keys(order, a, b));
        due.truncate(limit);

        Ok(due)
    }

    async fn has_due(&self) -> Result<bool, StoreError> {
        let now = Utc::now();
        let inner = self.inner.lock().await;
        Ok(inner.notifications.iter().any(|n| n.is_due(now)))
    }

    async fn set_status(
        &self,
        ids: &[Uuid],
        status: NotificationStatus,
    ) -> Result<(), StoreError> {
        let ids: HashSet<Uuid> = ids.iter().copied().collect();
        let now = Utc::now();
        let mut inner = self.inner.lock().await;

        for notification in &mut inner.notifications {
            if ids.contains(&notification.id) {
                notification.status = Some(status);
                notification.last_updated = now;
            }
        }

        Ok(())
    }

    async fn append_logs(&self, logs: Vec<NewDeliveryLog>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.logs.extend(logs.into_iter().map(DeliveryLog::from_draft));
        Ok(())
    }

    async fn logs_for(&self, notification_id: Uuid) -> Result<Vec<DeliveryLog>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .logs
            .iter()
            .filter(|log| log.notification_id == notification_id)
            .cloned()
            .collect())
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;

        let deleted_ids: HashSet<Uuid> = inner
            .notifications
            .iter()
            .filter(|n| n.created < cutoff)
            .map(|n| n.id)
            .collect();

        inner.notifications.retain(|n| !deleted_ids.contains(&n.id));
        inner
            .logs
            .retain(|log| !deleted_ids.contains(&log.notification_id));

        Ok(deleted_ids.len() as u64)
    }
}
