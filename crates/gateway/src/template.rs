//! Response body templating.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unterminated placeholder at byte {0}")]
    Unterminated(usize),
}

/// Renders a route's response template against a JSON context.
pub trait TemplateRenderer: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`TemplateError`] if the template is malformed.
    fn render(&self, template: &str, context: &Value) -> Result<String, TemplateError>;
}

/// `{{ dotted.path }}` substitution. Strings are inserted as-is, other values as JSON, and
/// missing values as the empty string. Array elements are addressed by index (`items.0`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRenderer;

fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(context, |current, part| match current {
        Value::Object(map) => map.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn render_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

impl TemplateRenderer for PlaceholderRenderer {
    fn render(&self, template: &str, context: &Value) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        let mut offset = 0;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];
            let end = after_open
                .find("}}")
                .ok_or(TemplateError::Unterminated(offset + start))?;
            let path = after_open[..end].trim();
            if !path.is_empty() {
                out.push_str(&render_value(lookup(context, path)));
            }
            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        out.push_str(rest);
        Ok(out)
    }
}
