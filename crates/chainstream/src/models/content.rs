use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
/// Content carried by a message or a streamed chunk
///
/// Most producers send plain text. Multimodal models and tool results may
/// instead carry an ordered list of structured parts, or a single structured
/// value. Only `Text` can be folded into a final answer.
pub enum MessageContent {
    Text(String),
    Parts(Vec<Value>),
    Structured(Value),
}

impl MessageContent {
    pub fn text<S: Into<String>>(text: S) -> Self {
        MessageContent::Text(text.into())
    }

    pub fn parts(parts: Vec<Value>) -> Self {
        MessageContent::Parts(parts)
    }

    /// Get the text if this is a Text variant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Empty text, an empty part list and falsy JSON values count as no content
    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(text) => text.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
            MessageContent::Structured(value) => is_falsy(value),
        }
    }

    /// Short name of the shape, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            MessageContent::Text(_) => "string",
            MessageContent::Parts(_) => "list",
            MessageContent::Structured(Value::Object(_)) => "object",
            MessageContent::Structured(Value::Null) => "null",
            MessageContent::Structured(_) => "value",
        }
    }
}

/// `null`, `false`, zero and empty strings, arrays or objects
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !*b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::text(text)
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<Vec<Value>> for MessageContent {
    fn from(parts: Vec<Value>) -> Self {
        MessageContent::Parts(parts)
    }
}
