#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use push_dispatch::clients::PushSender;
use push_dispatch::clients::template::{SimpleTemplateRenderer, TemplateRenderer};
use push_dispatch::config::{Config, TemplateEngine};
use push_dispatch::dispatch::DispatchEngine;
use push_dispatch::error::{RenderError, SendError, StoreError};
use push_dispatch::message::RenderedMessage;
use push_dispatch::models::log::{DeliveryLog, LogLevel, NewDeliveryLog};
use push_dispatch::models::notification::{
    NewNotification, Notification, NotificationStatus, Priority,
};
use push_dispatch::models::template::MessageTemplate;
use push_dispatch::store::{InMemoryStore, NotificationStore, SortKey};

pub fn device_token(label: &str) -> String {
    format!("device-token-{label}-0123456789")
}

pub fn test_config() -> Config {
    Config {
        fcm_project_id: "test-project".to_string(),
        fcm_credentials_path: None,
        fcm_endpoint: None,
        database_url: "postgres://unused".to_string(),
        batch_size: 100,
        threads_per_process: 5,
        default_priority: Priority::Medium,
        log_level: LogLevel::All,
        sending_order: vec![SortKey::descending_priority()],
        template_engine: TemplateEngine::Simple,
        processes: 1,
        lockfile: std::env::temp_dir().join("push_dispatch_test.lock"),
        retention_days: 90,
    }
}

pub fn engine_from(
    store: Arc<dyn NotificationStore>,
    sender: Arc<dyn PushSender>,
    config: &Config,
) -> DispatchEngine {
    DispatchEngine::new(store, sender, Arc::new(SimpleTemplateRenderer), config)
}

pub fn engine(store: &InMemoryStore, sender: Arc<dyn PushSender>) -> DispatchEngine {
    engine_from(Arc::new(store.clone()), sender, &test_config())
}

pub fn engine_with(
    store: &InMemoryStore,
    sender: Arc<dyn PushSender>,
    config: &Config,
) -> DispatchEngine {
    engine_from(Arc::new(store.clone()), sender, config)
}

/// Queued draft with literal content.
pub fn queued_draft(title: &str) -> NewNotification {
    NewNotification {
        to: vec![device_token("recipient")],
        title: title.to_string(),
        text: "body".to_string(),
        status: Some(NotificationStatus::Queued),
        priority: Priority::Medium,
        scheduled_time: None,
        template: None,
        context: HashMap::new(),
    }
}

/// Queued draft that renders from a template at dispatch time.
pub fn deferred_draft(
    template: MessageTemplate,
    context: HashMap<String, JsonValue>,
) -> NewNotification {
    NewNotification {
        to: vec![device_token("recipient")],
        title: String::new(),
        text: String::new(),
        status: Some(NotificationStatus::Queued),
        priority: Priority::Medium,
        scheduled_time: None,
        template: Some(template),
        context,
    }
}

/// Fully materialized queued notification, for `insert_raw`.
pub fn raw_notification(title: &str) -> Notification {
    let now = Utc::now();
    Notification {
        id: Uuid::new_v4(),
        to: vec![device_token("raw")],
        title: title.to_string(),
        text: "body".to_string(),
        status: Some(NotificationStatus::Queued),
        priority: Priority::Medium,
        created: now,
        last_updated: now,
        scheduled_time: None,
        template: None,
        context: HashMap::new(),
    }
}

pub fn greeting_template() -> MessageTemplate {
    MessageTemplate {
        name: "greeting".to_string(),
        subject: "Hello {{name}}".to_string(),
        content: "You have {{count}} new messages".to_string(),
        html_content: Some(
            "You have <b>{{count}}</b> new <a href=\"/inbox\">messages</a>".to_string(),
        ),
    }
}

pub fn greeting_context() -> HashMap<String, JsonValue> {
    HashMap::from([
        ("name".to_string(), json!("Ada")),
        ("count".to_string(), json!(3)),
    ])
}

/// Push sender double: records every call and optionally fails messages
/// whose title contains a marker.
pub struct FakeSender {
    calls: Mutex<Vec<(Vec<String>, RenderedMessage)>>,
    fail_marker: Option<String>,
}

impl FakeSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_marker: None,
        })
    }

    pub fn failing_on(marker: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_marker: Some(marker.to_string()),
        })
    }

    pub fn calls(&self) -> Vec<(Vec<String>, RenderedMessage)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn sent_messages(&self) -> Vec<RenderedMessage> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }
}

#[async_trait]
impl PushSender for FakeSender {
    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &RenderedMessage,
    ) -> Result<(), SendError> {
        self.calls
            .lock()
            .unwrap()
            .push((tokens.to_vec(), message.clone()));

        if let Some(marker) = &self.fail_marker {
            if message.title.contains(marker) {
                return Err(SendError::Backend {
                    status: 500,
                    detail: "simulated backend failure".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Renderer that counts invocations, for cache-hit assertions.
pub struct CountingRenderer {
    inner: SimpleTemplateRenderer,
    renders: AtomicUsize,
}

impl CountingRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SimpleTemplateRenderer,
            renders: AtomicUsize::new(0),
        })
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl TemplateRenderer for CountingRenderer {
    fn render_from_string(
        &self,
        code: &str,
        context: &HashMap<String, JsonValue>,
    ) -> Result<String, RenderError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        self.inner.render_from_string(code, context)
    }
}

/// Store double whose every operation fails, for fatal-path assertions.
pub struct FailingStore;

fn store_down() -> StoreError {
    StoreError::Database(sqlx::Error::PoolClosed)
}

#[async_trait]
impl NotificationStore for FailingStore {
    async fn insert(&self, _draft: NewNotification) -> Result<Notification, StoreError> {
        Err(store_down())
    }

    async fn insert_many(
        &self,
        _drafts: Vec<NewNotification>,
    ) -> Result<Vec<Notification>, StoreError> {
        Err(store_down())
    }

    async fn get(&self, _id: Uuid) -> Result<Option<Notification>, StoreError> {
        Err(store_down())
    }

    async fn fetch_due(
        &self,
        _limit: usize,
        _order: &[SortKey],
    ) -> Result<Vec<Notification>, StoreError> {
        Err(store_down())
    }

    async fn has_due(&self) -> Result<bool, StoreError> {
        Err(store_down())
    }

    async fn set_status(
        &self,
        _ids: &[Uuid],
        _status: NotificationStatus,
    ) -> Result<(), StoreError> {
        Err(store_down())
    }

    async fn append_logs(&self, _logs: Vec<NewDeliveryLog>) -> Result<(), StoreError> {
        Err(store_down())
    }

    async fn logs_for(&self, _notification_id: Uuid) -> Result<Vec<DeliveryLog>, StoreError> {
        Err(store_down())
    }

    async fn delete_created_before(&self, _cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        Err(store_down())
    }
}
