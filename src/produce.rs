//! The produce API: creating notifications, inline dispatch for priority
//! `now`, bulk creation and manual requeue.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::clients::template::TemplateRenderer;
use crate::dispatch::DispatchEngine;
use crate::error::{ProduceError, StoreError};
use crate::message::render_and_clean;
use crate::models::log::LogLevel;
use crate::models::notification::{NewNotification, Notification, NotificationStatus, Priority};
use crate::models::template::MessageTemplate;
use crate::store::NotificationStore;

#[derive(Clone, Debug, Default)]
pub struct SendOptions {
    pub title: String,
    pub text: String,
    pub context: HashMap<String, JsonValue>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub template: Option<MessageTemplate>,
    pub priority: Option<Priority>,
    pub render_on_delivery: bool,
}

/// One item of a [`send_many`] batch.
#[derive(Clone, Debug)]
pub struct SendRequest {
    pub recipients: Vec<String>,
    pub options: SendOptions,
}

fn validate_device_token(token: &str) -> Result<(), ProduceError> {
    if token.is_empty() {
        return Err(ProduceError::Configuration(
            "device token cannot be empty".to_string(),
        ));
    }

    if token.len() < 20 {
        return Err(ProduceError::Configuration(
            "device token too short (minimum 20 characters)".to_string(),
        ));
    }

    if token.len() > 200 {
        return Err(ProduceError::Configuration(
            "device token too long (maximum 200 characters)".to_string(),
        ));
    }

    let valid_chars = token
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '.');

    if !valid_chars {
        return Err(ProduceError::Configuration(
            "device token contains invalid characters".to_string(),
        ));
    }

    Ok(())
}

/// Builds the draft a creation call will persist. With render-on-delivery
/// the template and context are stored for dispatch time; otherwise content
/// is rendered eagerly here, through the same render-and-clean pass the
/// dispatch path uses.
fn build_notification(
    renderer: &dyn TemplateRenderer,
    recipients: Vec<String>,
    options: &SendOptions,
    default_priority: Priority,
) -> Result<NewNotification, ProduceError> {
    if recipients.is_empty() {
        return Err(ProduceError::Configuration(
            "at least one recipient is required".to_string(),
        ));
    }
    for token in &recipients {
        validate_device_token(token)?;
    }

    if options.render_on_delivery
        && options.template.is_some()
        && (!options.title.is_empty() || !options.text.is_empty())
    {
        return Err(ProduceError::Configuration(
            "a template cannot be combined with literal title or text \
             when rendering on delivery"
                .to_string(),
        ));
    }

    let priority = options.priority.unwrap_or(default_priority);
    let status = if priority == Priority::Now {
        None
    } else {
        Some(NotificationStatus::Queued)
    };

    let draft = if options.render_on_delivery {
        NewNotification {
            to: recipients,
            title: String::new(),
            text: String::new(),
            status,
            priority,
            scheduled_time: options.scheduled_time,
            template: options.template.clone(),
            context: options.context.clone(),
        }
    } else {
        let (title, text) = match &options.template {
            Some(template) => (
                render_and_clean(renderer, &template.subject, &options.context)?,
                render_and_clean(renderer, template.body_source(), &options.context)?,
            ),
            None => (
                renderer.render_from_string(&options.title, &options.context)?,
                renderer.render_from_string(&options.text, &options.context)?,
            ),
        };

        NewNotification {
            to: recipients,
            title,
            text,
            status,
            priority,
            scheduled_time: options.scheduled_time,
            template: None,
            context: HashMap::new(),
        }
    };

    Ok(draft)
}

/// Creates and persists a notification without dispatching it.
pub async fn create(
    store: &dyn NotificationStore,
    renderer: &dyn TemplateRenderer,
    recipients: Vec<String>,
    options: SendOptions,
    default_priority: Priority,
) -> Result<Notification, ProduceError> {
    let draft = build_notification(renderer, recipients, &options, default_priority)?;
    Ok(store.insert(draft).await?)
}

/// Creates a notification and, for priority `now`, dispatches it inline
/// instead of leaving it for the drain loop.
pub async fn send(
    engine: &DispatchEngine,
    recipients: Vec<String>,
    options: SendOptions,
    log_level: LogLevel,
) -> Result<Notification, ProduceError> {
    let draft = build_notification(
        engine.renderer().as_ref(),
        recipients,
        &options,
        engine.default_priority(),
    )?;
    let notification = engine.store().insert(draft).await?;

    if notification.priority == Priority::Now {
        engine.dispatch_one(&notification, log_level).await?;
        if let Some(updated) = engine.store().get(notification.id).await? {
            return Ok(updated);
        }
    }

    Ok(notification)
}

/// Bulk creation with a single batch insert. Inline dispatch is not
/// available here, so a priority `now` item is a configuration error.
pub async fn send_many(
    store: &dyn NotificationStore,
    renderer: &dyn TemplateRenderer,
    requests: Vec<SendRequest>,
    default_priority: Priority,
) -> Result<Vec<Notification>, ProduceError> {
    let mut drafts = Vec::with_capacity(requests.len());

    for request in requests {
        let draft =
            build_notification(renderer, request.recipients, &request.options, default_priority)?;
        if draft.priority == Priority::Now {
            return Err(ProduceError::Configuration(
                "send_many cannot be used with priority 'now'".to_string(),
            ));
        }
        drafts.push(draft);
    }

    Ok(store.insert_many(drafts).await?)
}

/// Manual retry: puts a resolved notification back in the queue so the next
/// drain picks it up.
pub async fn requeue(store: &dyn NotificationStore, id: Uuid) -> Result<(), ProduceError> {
    if store.get(id).await?.is_none() {
        return Err(StoreError::NotFound(id).into());
    }

    store.set_status(&[id], NotificationStatus::Queued).await?;
    Ok(())
}
