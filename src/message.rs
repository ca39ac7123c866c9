use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::clients::template::TemplateRenderer;
use crate::error::RenderError;
use crate::models::notification::Notification;

static NON_ANCHOR_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(<[^aA/].*?>|</[^aA].*?>)").expect("non-anchor tag pattern"));

/// Removes every HTML tag except anchors from rendered text. Sanitization,
/// not escaping: rendering itself stays raw.
pub fn strip_non_anchor_tags(text: &str) -> String {
    NON_ANCHOR_TAGS.replace_all(text, "").into_owned()
}

pub fn render_and_clean(
    renderer: &dyn TemplateRenderer,
    code: &str,
    context: &HashMap<String, JsonValue>,
) -> Result<String, RenderError> {
    let rendered = renderer.render_from_string(code, context)?;
    Ok(strip_non_anchor_tags(&rendered))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub title: String,
    pub body: String,
}

/// Turns a notification into its deliverable message. Rendered results are
/// cached in a side map keyed by notification id, so the cache lives exactly
/// as long as one dispatch attempt and never rides on the stored entity.
pub struct MessageBuilder {
    renderer: Arc<dyn TemplateRenderer>,
    cache: HashMap<Uuid, RenderedMessage>,
}

impl MessageBuilder {
    pub fn new(renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self {
            renderer,
            cache: HashMap::new(),
        }
    }

    /// Idempotent per notification: the second call for the same id is a
    /// cache hit and performs no rendering work.
    pub fn render(&mut self, notification: &Notification) -> Result<RenderedMessage, RenderError> {
        if let Some(cached) = self.cache.get(&notification.id) {
            return Ok(cached.clone());
        }

        let message = match &notification.template {
            Some(template) => RenderedMessage {
                title: render_and_clean(
                    self.renderer.as_ref(),
                    &template.subject,
                    &notification.context,
                )?,
                body: render_and_clean(
                    self.renderer.as_ref(),
                    template.body_source(),
                    &notification.context,
                )?,
            },
            None => RenderedMessage {
                title: notification.title.clone(),
                body: notification.text.clone(),
            },
        };

        self.cache.insert(notification.id, message.clone());
        Ok(message)
    }
}
