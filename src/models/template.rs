use serde::{Deserialize, Serialize};

/// Content template for a notification. The subject renders into the title,
/// the HTML variant is preferred for the body when declared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub name: String,
    pub subject: String,
    pub content: String,
    #[serde(default)]
    pub html_content: Option<String>,
}

impl MessageTemplate {
    pub fn body_source(&self) -> &str {
        self.html_content.as_deref().unwrap_or(&self.content)
    }
}
