use std::fmt::{Display, Formatter, Result};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Log verbosity for dispatch outcomes. Governs what gets persisted, never
/// what gets executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[serde(try_from = "u8")]
pub enum LogLevel {
    Off,
    Failures,
    #[default]
    All,
}

impl LogLevel {
    pub fn logs_failures(self) -> bool {
        self >= LogLevel::Failures
    }

    pub fn logs_successes(self) -> bool {
        self == LogLevel::All
    }
}

impl TryFrom<u8> for LogLevel {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, String> {
        match value {
            0 => Ok(LogLevel::Off),
            1 => Ok(LogLevel::Failures),
            2 => Ok(LogLevel::All),
            other => Err(format!("invalid log level: {other}, expected 0, 1 or 2")),
        }
    }
}

/// Outcome recorded by a delivery log. Narrower than the notification status:
/// a log row is only ever written for a resolved dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Sent,
    Failed,
}

impl Display for LogStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            LogStatus::Sent => write!(f, "sent"),
            LogStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for LogStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "sent" => Ok(LogStatus::Sent),
            "failed" => Ok(LogStatus::Failed),
            other => Err(format!("invalid log status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLog {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub date: DateTime<Utc>,
    pub status: LogStatus,
    pub exception_type: String,
    pub message: String,
}

impl DeliveryLog {
    pub fn from_draft(draft: NewDeliveryLog) -> Self {
        Self {
            id: Uuid::new_v4(),
            notification_id: draft.notification_id,
            date: Utc::now(),
            status: draft.status,
            exception_type: draft.exception_type,
            message: draft.message,
        }
    }

    /// Shortened message for summary views. Storage keeps the full text.
    pub fn summary(&self) -> String {
        self.message.chars().take(25).collect()
    }
}

#[derive(Debug, Clone)]
pub struct NewDeliveryLog {
    pub notification_id: Uuid,
    pub status: LogStatus,
    pub exception_type: String,
    pub message: String,
}

impl NewDeliveryLog {
    pub fn sent(notification_id: Uuid) -> Self {
        Self {
            notification_id,
            status: LogStatus::Sent,
            exception_type: String::new(),
            message: String::new(),
        }
    }

    pub fn failed(
        notification_id: Uuid,
        exception_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            notification_id,
            status: LogStatus::Failed,
            exception_type: exception_type.into(),
            message: message.into(),
        }
    }
}
