use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::warn;

use crate::config::TemplateEngine;
use crate::error::RenderError;

/// Rendering capability behind the message builder. Implementations are
/// interchangeable; the engine in use is picked from configuration at
/// startup, not per call.
pub trait TemplateRenderer: Send + Sync {
    fn render_from_string(
        &self,
        code: &str,
        context: &HashMap<String, JsonValue>,
    ) -> Result<String, RenderError>;
}

pub fn renderer_for(engine: TemplateEngine) -> Arc<dyn TemplateRenderer> {
    match engine {
        TemplateEngine::Simple => Arc::new(SimpleTemplateRenderer),
    }
}

/// Placeholder-substitution engine: every `{{variable}}` is replaced with the
/// matching context value. An unreplaced placeholder is an error rather than
/// silently delivered markup.
pub struct SimpleTemplateRenderer;

impl TemplateRenderer for SimpleTemplateRenderer {
    fn render_from_string(
        &self,
        code: &str,
        context: &HashMap<String, JsonValue>,
    ) -> Result<String, RenderError> {
        let mut result = code.to_string();

        for (key, value) in context {
            let placeholder = format!("{{{{{}}}}}", key);

            if !result.contains(&placeholder) {
                continue;
            }

            let replacement = match value {
                JsonValue::String(s) => s.clone(),
                JsonValue::Number(n) => n.to_string(),
                JsonValue::Bool(b) => b.to_string(),
                JsonValue::Null => String::new(),
                _ => {
                    return Err(RenderError::UnsupportedValue(key.clone()));
                }
            };

            result = result.replace(&placeholder, &replacement);
        }

        if let Some(start) = result.find("{{") {
            if let Some(end) = result[start..].find("}}") {
                let placeholder = &result[start..start + end + 2];

                warn!(
                    missing_variable = %placeholder,
                    "template contains unreplaced variable"
                );

                return Err(RenderError::MissingVariable(placeholder.to_string()));
            }
        }

        Ok(result)
    }
}
