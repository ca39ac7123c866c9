use async_trait::async_trait;

use crate::error::SendError;
use crate::message::RenderedMessage;

pub mod database;
pub mod fcm;
pub mod template;

/// Delivery capability of the push backend. One call covers every recipient
/// token of a notification; a call failure fails the whole notification, not
/// individual recipients.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &RenderedMessage,
    ) -> Result<(), SendError>;
}
