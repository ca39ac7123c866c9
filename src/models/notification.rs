use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::template::MessageTemplate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Now,
}

impl Priority {
    pub fn as_i16(self) -> i16 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
            Priority::Now => 3,
        }
    }

    pub fn from_i16(value: i16) -> std::result::Result<Self, String> {
        match value {
            0 => Ok(Priority::Low),
            1 => Ok(Priority::Medium),
            2 => Ok(Priority::High),
            3 => Ok(Priority::Now),
            other => Err(format!("invalid priority value: {other}")),
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Now => write!(f, "now"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Queued,
    Sent,
    Failed,
}

impl Display for NotificationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            NotificationStatus::Queued => write!(f, "queued"),
            NotificationStatus::Sent => write!(f, "sent"),
            NotificationStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "queued" => Ok(NotificationStatus::Queued),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            other => Err(format!("invalid notification status: {other}")),
        }
    }
}

/// A push notification as held by the store. The status is nullable: a
/// notification created with priority `now` is dispatched inline and never
/// enters the queued state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub to: Vec<String>,
    pub title: String,
    pub text: String,
    pub status: Option<NotificationStatus>,
    pub priority: Priority,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub template: Option<MessageTemplate>,
    pub context: HashMap<String, JsonValue>,
}

impl Notification {
    /// Builds a stored notification from a draft, assigning the identity and
    /// timestamps the store owns.
    pub fn from_draft(draft: NewNotification) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            to: draft.to,
            title: draft.title,
            text: draft.text,
            status: draft.status,
            priority: draft.priority,
            created: now,
            last_updated: now,
            scheduled_time: draft.scheduled_time,
            template: draft.template,
            context: draft.context,
        }
    }

    /// Whether the drain loop may pick this notification up.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == Some(NotificationStatus::Queued)
            && self.scheduled_time.is_none_or(|scheduled| scheduled <= now)
    }
}

/// Creation arguments for a notification; id and timestamps are assigned by
/// the store on insert.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub to: Vec<String>,
    pub title: String,
    pub text: String,
    pub status: Option<NotificationStatus>,
    pub priority: Priority,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub template: Option<MessageTemplate>,
    pub context: HashMap<String, JsonValue>,
}
