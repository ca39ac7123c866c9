//! The dispatch engine: selects due notifications, partitions them into
//! shards, fans the sends out over bounded worker pools and writes statuses
//! and delivery logs back in batches.

use std::sync::Arc;

use futures_util::{StreamExt, stream};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clients::PushSender;
use crate::clients::template::TemplateRenderer;
use crate::config::Config;
use crate::error::{DispatchError, RenderError, SendError};
use crate::message::{MessageBuilder, RenderedMessage};
use crate::models::log::{LogLevel, NewDeliveryLog};
use crate::models::notification::{Notification, NotificationStatus, Priority};
use crate::store::{NotificationStore, SortKey};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub sent: usize,
    pub failed: usize,
}

impl DrainStats {
    pub fn attempted(&self) -> usize {
        self.sent + self.failed
    }

    fn merge(&mut self, other: DrainStats) {
        self.sent += other.sent;
        self.failed += other.failed;
    }
}

#[derive(Debug, Error)]
enum DeliveryFailure {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Send(#[from] SendError),
}

impl DeliveryFailure {
    fn kind(&self) -> &'static str {
        match self {
            DeliveryFailure::Render(e) => e.kind(),
            DeliveryFailure::Send(e) => e.kind(),
        }
    }
}

/// A selected notification with its pre-rendered message. Rendering happens
/// on the selecting task before any shard spawns, so shard workers never
/// touch the renderer.
struct Prepared {
    notification: Notification,
    rendered: Result<RenderedMessage, RenderError>,
}

/// Splits a batch into `shard_count` contiguous runs of near-equal size,
/// preserving order. Never yields more shards than items.
pub fn split_into_shards<T>(items: Vec<T>, shard_count: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    if shard_count <= 1 {
        return vec![items];
    }

    let shard_count = shard_count.min(items.len());
    let base = items.len() / shard_count;
    let extra = items.len() % shard_count;

    let mut shards = Vec::with_capacity(shard_count);
    let mut iter = items.into_iter();
    for index in 0..shard_count {
        let size = base + usize::from(index < extra);
        shards.push(iter.by_ref().take(size).collect());
    }

    shards
}

#[derive(Clone)]
pub struct DispatchEngine {
    store: Arc<dyn NotificationStore>,
    sender: Arc<dyn PushSender>,
    renderer: Arc<dyn TemplateRenderer>,
    batch_size: usize,
    threads_per_process: usize,
    default_priority: Priority,
    sending_order: Vec<SortKey>,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        sender: Arc<dyn PushSender>,
        renderer: Arc<dyn TemplateRenderer>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            sender,
            renderer,
            batch_size: config.batch_size,
            threads_per_process: config.threads_per_process,
            default_priority: config.default_priority,
            sending_order: config.sending_order.clone(),
        }
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    pub fn renderer(&self) -> &Arc<dyn TemplateRenderer> {
        &self.renderer
    }

    pub fn default_priority(&self) -> Priority {
        self.default_priority
    }

    /// One drain pass: select up to a batch of due notifications and resolve
    /// every one of them to sent or failed. Returns the pass totals; an
    /// empty queue returns zeros immediately.
    pub async fn drain_once(
        &self,
        shard_count: usize,
        log_level: LogLevel,
    ) -> Result<DrainStats, DispatchError> {
        let queued = self
            .store
            .fetch_due(self.batch_size, &self.sending_order)
            .await?;

        if queued.is_empty() {
            return Ok(DrainStats::default());
        }

        let total = queued.len();
        let shard_count = shard_count.clamp(1, total);

        info!(total, shard_count, "started sending queued notifications");

        let mut builder = MessageBuilder::new(self.renderer.clone());
        let prepared: Vec<Prepared> = queued
            .into_iter()
            .map(|notification| {
                let rendered = builder.render(&notification);
                Prepared {
                    notification,
                    rendered,
                }
            })
            .collect();

        let stats = if shard_count == 1 {
            self.send_shard(prepared, log_level).await?
        } else {
            let mut handles = Vec::with_capacity(shard_count);
            for shard in split_into_shards(prepared, shard_count) {
                let engine = self.clone();
                handles.push(tokio::spawn(async move {
                    engine.send_shard(shard, log_level).await
                }));
            }

            let mut totals = DrainStats::default();
            for handle in handles {
                let shard_stats = handle
                    .await
                    .map_err(|e| DispatchError::Internal(e.to_string()))??;
                totals.merge(shard_stats);
            }
            totals
        };

        info!(
            attempted = total,
            sent = stats.sent,
            failed = stats.failed,
            "finished sending queued notifications"
        );

        Ok(stats)
    }

    /// Delivers one shard through a bounded worker pool. Workers only
    /// classify outcomes; statuses and logs are written back in one batch
    /// per outcome class after every worker has finished.
    async fn send_shard(
        &self,
        shard: Vec<Prepared>,
        log_level: LogLevel,
    ) -> Result<DrainStats, DispatchError> {
        let count = shard.len();
        debug!(count, "shard started");

        let workers = self.threads_per_process.min(count).max(1);
        let outcomes: Vec<(Notification, Result<(), DeliveryFailure>)> = stream::iter(shard)
            .map(|prepared| {
                let sender = self.sender.clone();
                async move {
                    let Prepared {
                        notification,
                        rendered,
                    } = prepared;

                    let outcome = match rendered {
                        Ok(message) => sender
                            .send_multicast(&notification.to, &message)
                            .await
                            .map_err(DeliveryFailure::from),
                        Err(e) => Err(DeliveryFailure::from(e)),
                    };

                    match &outcome {
                        Ok(()) => debug!(id = %notification.id, "notification sent"),
                        Err(e) => debug!(id = %notification.id, error = %e, "notification failed"),
                    }

                    (notification, outcome)
                }
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut sent_ids: Vec<Uuid> = Vec::new();
        let mut failed: Vec<(Notification, DeliveryFailure)> = Vec::new();
        for (notification, outcome) in outcomes {
            match outcome {
                Ok(()) => sent_ids.push(notification.id),
                Err(e) => failed.push((notification, e)),
            }
        }

        if !sent_ids.is_empty() {
            self.store
                .set_status(&sent_ids, NotificationStatus::Sent)
                .await?;
        }

        let failed_ids: Vec<Uuid> = failed.iter().map(|(n, _)| n.id).collect();
        if !failed_ids.is_empty() {
            self.store
                .set_status(&failed_ids, NotificationStatus::Failed)
                .await?;
        }

        if log_level.logs_failures() && !failed.is_empty() {
            let logs = failed
                .iter()
                .map(|(n, e)| NewDeliveryLog::failed(n.id, e.kind(), e.to_string()))
                .collect();
            self.store.append_logs(logs).await?;
        }

        if log_level.logs_successes() && !sent_ids.is_empty() {
            let logs = sent_ids.iter().map(|id| NewDeliveryLog::sent(*id)).collect();
            self.store.append_logs(logs).await?;
        }

        debug!(
            attempted = count,
            sent = sent_ids.len(),
            failed = failed.len(),
            "shard finished"
        );

        Ok(DrainStats {
            sent: sent_ids.len(),
            failed: failed.len(),
        })
    }

    /// Single-notification dispatch, used for priority `now` deliveries that
    /// bypass the queue. Resolves the status, writes it back and logs per
    /// the configured level.
    pub async fn dispatch_one(
        &self,
        notification: &Notification,
        log_level: LogLevel,
    ) -> Result<NotificationStatus, DispatchError> {
        let mut builder = MessageBuilder::new(self.renderer.clone());

        let outcome: Result<(), DeliveryFailure> = match builder.render(notification) {
            Ok(message) => self
                .sender
                .send_multicast(&notification.to, &message)
                .await
                .map_err(DeliveryFailure::from),
            Err(e) => Err(DeliveryFailure::from(e)),
        };

        let (status, log) = match outcome {
            Ok(()) => (
                NotificationStatus::Sent,
                NewDeliveryLog::sent(notification.id),
            ),
            Err(e) => (
                NotificationStatus::Failed,
                NewDeliveryLog::failed(notification.id, e.kind(), e.to_string()),
            ),
        };

        self.store.set_status(&[notification.id], status).await?;

        let should_log = match status {
            NotificationStatus::Failed => log_level.logs_failures(),
            _ => log_level.logs_successes(),
        };
        if should_log {
            self.store.append_logs(vec![log]).await?;
        }

        Ok(status)
    }
}
