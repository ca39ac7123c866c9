use chrono::{Duration, Utc};
use tracing::info;

use crate::error::StoreError;
use crate::store::NotificationStore;

/// Retention job: deletes notifications created more than `older_than_days`
/// ago, cascading to their delivery logs. Store failures propagate to the
/// caller; a count without a failure signal would hide them.
pub async fn cleanup_notifications(
    store: &dyn NotificationStore,
    older_than_days: i64,
) -> Result<u64, StoreError> {
    let cutoff = Utc::now() - Duration::days(older_than_days);
    let deleted = store.delete_created_before(cutoff).await?;

    info!(deleted, cutoff = %cutoff, "deleted notifications created before cutoff");

    Ok(deleted)
}
