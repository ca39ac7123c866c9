use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    log::{DeliveryLog, LogStatus, NewDeliveryLog},
    notification::{NewNotification, Notification, NotificationStatus, Priority},
};
use crate::store::{NotificationStore, SortField, SortKey};

const NOTIFICATION_COLUMNS: &str = "id, recipients, title, text, status, priority, created, \
                                    last_updated, scheduled_time, template, context";

/// PostgreSQL-backed notification store. Recipients are persisted in the
/// newline-joined external form; templates and context as JSONB.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        info!("connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        info!("PostgreSQL connection established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn decode_err(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> StoreError {
    StoreError::Database(sqlx::Error::Decode(e.into()))
}

fn row_to_notification(row: &PgRow) -> Result<Notification, StoreError> {
    let recipients: String = row.try_get("recipients").map_err(StoreError::Database)?;
    let status: Option<String> = row.try_get("status").map_err(StoreError::Database)?;
    let priority: i16 = row.try_get("priority").map_err(StoreError::Database)?;
    let template: Option<serde_json::Value> =
        row.try_get("template").map_err(StoreError::Database)?;
    let context: serde_json::Value = row.try_get("context").map_err(StoreError::Database)?;

    Ok(Notification {
        id: row.try_get("id").map_err(StoreError::Database)?,
        to: recipients.lines().map(str::to_string).collect(),
        title: row.try_get("title").map_err(StoreError::Database)?,
        text: row.try_get("text").map_err(StoreError::Database)?,
        status: status
            .as_deref()
            .map(str::parse::<NotificationStatus>)
            .transpose()
            .map_err(decode_err)?,
        priority: Priority::from_i16(priority).map_err(decode_err)?,
        created: row.try_get("created").map_err(StoreError::Database)?,
        last_updated: row.try_get("last_updated").map_err(StoreError::Database)?,
        scheduled_time: row
            .try_get("scheduled_time")
            .map_err(StoreError::Database)?,
        template: template.map(serde_json::from_value).transpose()?,
        context: serde_json::from_value(context)?,
    })
}

fn row_to_log(row: &PgRow) -> Result<DeliveryLog, StoreError> {
    let status: String = row.try_get("status").map_err(StoreError::Database)?;

    Ok(DeliveryLog {
        id: row.try_get("id").map_err(StoreError::Database)?,
        notification_id: row
            .try_get("notification_id")
            .map_err(StoreError::Database)?,
        date: row.try_get("date").map_err(StoreError::Database)?,
        status: status.parse::<LogStatus>().map_err(decode_err)?,
        exception_type: row
            .try_get("exception_type")
            .map_err(StoreError::Database)?,
        message: row.try_get("message").map_err(StoreError::Database)?,
    })
}

fn order_sql(keys: &[SortKey]) -> String {
    if keys.is_empty() {
        return "priority DESC".to_string();
    }

    keys.iter()
        .map(|key| {
            let column = match key.field {
                SortField::Priority => "priority",
                SortField::Created => "created",
                SortField::LastUpdated => "last_updated",
                SortField::ScheduledTime => "scheduled_time",
            };
            let direction = if key.descending { "DESC" } else { "ASC" };
            format!("{column} {direction}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

async fn insert_notification<'e, E>(executor: E, n: &Notification) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO push_notifications \
         (id, recipients, title, text, status, priority, created, last_updated, \
          scheduled_time, template, context) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(n.id)
    .bind(n.to.join("\n"))
    .bind(&n.title)
    .bind(&n.text)
    .bind(n.status.map(|status| status.to_string()))
    .bind(n.priority.as_i16())
    .bind(n.created)
    .bind(n.last_updated)
    .bind(n.scheduled_time)
    .bind(
        n.template
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?,
    )
    .bind(serde_json::to_value(&n.context)?)
    .execute(executor)
    .await?;

    Ok(())
}

async fn insert_log<'e, E>(executor: E, log: &DeliveryLog) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO push_notification_logs \
         (id, notification_id, date, status, exception_type, message) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(log.id)
    .bind(log.notification_id)
    .bind(log.date)
    .bind(log.status.to_string())
    .bind(&log.exception_type)
    .bind(&log.message)
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait]
impl NotificationStore for PostgresStore {
    async fn insert(&self, draft: NewNotification) -> Result<Notification, StoreError> {
        let notification = Notification::from_draft(draft);
        insert_notification(&self.pool, &notification).await?;
        Ok(notification)
    }

    async fn insert_many(
        &self,
        drafts: Vec<NewNotification>,
    ) -> Result<Vec<Notification>, StoreError> {
        let notifications: Vec<Notification> =
            drafts.into_iter().map(Notification::from_draft).collect();

        let mut tx = self.pool.begin().await?;
        for notification in &notifications {
            insert_notification(&mut *tx, notification).await?;
        }
        tx.commit().await?;

        Ok(notifications)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM push_notifications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_notification).transpose()
    }

    async fn fetch_due(
        &self,
        limit: usize,
        order: &[SortKey],
    ) -> Result<Vec<Notification>, StoreError> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM push_notifications \
             WHERE status = 'queued' AND (scheduled_time IS NULL OR scheduled_time <= $1) \
             ORDER BY {} LIMIT $2",
            order_sql(order)
        );

        let rows = sqlx::query(&sql)
            .bind(Utc::now())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_notification).collect()
    }

    async fn has_due(&self) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS ( \
             SELECT 1 FROM push_notifications \
             WHERE status = 'queued' AND (scheduled_time IS NULL OR scheduled_time <= $1))",
        )
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn set_status(
        &self,
        ids: &[Uuid],
        status: NotificationStatus,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE push_notifications SET status = $1, last_updated = $2 WHERE id = ANY($3)",
        )
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(ids.to_vec())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_logs(&self, logs: Vec<NewDeliveryLog>) -> Result<(), StoreError> {
        let logs: Vec<DeliveryLog> = logs.into_iter().map(DeliveryLog::from_draft).collect();

        let mut tx = self.pool.begin().await?;
        for log in &logs {
            insert_log(&mut *tx, log).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn logs_for(&self, notification_id: Uuid) -> Result<Vec<DeliveryLog>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, notification_id, date, status, exception_type, message \
             FROM push_notification_logs WHERE notification_id = $1 ORDER BY date",
        )
        .bind(notification_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_log).collect()
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM push_notifications WHERE created < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
