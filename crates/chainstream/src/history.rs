//! Split a conversation history into conversational content and tool plumbing
//!
//! Both functions accept typed [`Message`]s or raw JSON maps. A map is kept
//! when its `type` is `human`, `ai` or `tool`; any other field that is
//! missing or wrongly shaped falls back to its empty value.
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};

use crate::models::content::is_falsy;
use crate::models::message::{AiMessage, HumanMessage, Message, ToolMessage};
use crate::models::tool::ToolCall;

/// Anything the classifier can normalize into a [`Message`]
pub trait IntoMessage {
    fn into_message(self) -> Option<Message>;
}

impl IntoMessage for Message {
    fn into_message(self) -> Option<Message> {
        Some(self)
    }
}

impl IntoMessage for &Message {
    fn into_message(self) -> Option<Message> {
        Some(self.clone())
    }
}

impl IntoMessage for Value {
    fn into_message(self) -> Option<Message> {
        normalize(&self)
    }
}

impl IntoMessage for &Value {
    fn into_message(self) -> Option<Message> {
        normalize(self)
    }
}

fn normalize(value: &Value) -> Option<Message> {
    let Some(map) = value.as_object() else {
        tracing::debug!("Skipping message that is not a map");
        return None;
    };

    let message = match map.get("type").and_then(Value::as_str) {
        Some("human") => Message::Human(HumanMessage {
            content: field(map, "content"),
        }),
        Some("ai") => Message::Ai(AiMessage {
            content: field(map, "content"),
            tool_calls: tool_calls(map.get("tool_calls")),
            additional_kwargs: field(map, "additional_kwargs"),
        }),
        Some("tool") => Message::Tool(ToolMessage {
            content: field(map, "content"),
            tool_call_id: field(map, "tool_call_id"),
            name: field(map, "name"),
        }),
        other => {
            tracing::debug!(message_type = ?other, "Skipping message with unknown type");
            return None;
        }
    };
    Some(message)
}

fn field<T: DeserializeOwned + Default>(map: &Map<String, Value>, key: &str) -> T {
    match map.get(key) {
        None | Some(Value::Null) => T::default(),
        Some(value) => T::deserialize(value).unwrap_or_else(|e| {
            tracing::debug!("Ignoring malformed `{}`: {}", key, e);
            T::default()
        }),
    }
}

// Any truthy value marks a tool request; entries that do not parse keep the
// raw value as their arguments.
fn tool_calls(value: Option<&Value>) -> Vec<ToolCall> {
    let items = match value {
        None => return Vec::new(),
        Some(value) if is_falsy(value) => return Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    };

    items
        .into_iter()
        .map(|item| match ToolCall::deserialize(&item) {
            Ok(call) => call,
            Err(e) => {
                tracing::debug!("Keeping malformed tool call as raw arguments: {}", e);
                ToolCall {
                    args: item,
                    ..Default::default()
                }
            }
        })
        .collect()
}

/// Keep human and AI messages that have non-empty content
///
/// Empty AI messages that only dispatch tool calls are dropped, as are tool
/// results. An AI message with both text and tool calls is kept.
pub fn extract_human_ai_messages<I>(messages: I) -> Vec<Message>
where
    I: IntoIterator,
    I::Item: IntoMessage,
{
    messages
        .into_iter()
        .filter_map(IntoMessage::into_message)
        .filter(|message| {
            matches!(message, Message::Human(_) | Message::Ai(_)) && !message.content().is_empty()
        })
        .collect()
}

/// Keep tool results and AI messages that request at least one tool call
///
/// AI messages in this set define the tool inputs, tool messages carry the
/// outputs.
pub fn extract_tool_calls_and_messages<I>(messages: I) -> Vec<Message>
where
    I: IntoIterator,
    I::Item: IntoMessage,
{
    messages
        .into_iter()
        .filter_map(IntoMessage::into_message)
        .filter(|message| match message {
            Message::Tool(_) => true,
            Message::Ai(ai) => !ai.tool_calls.is_empty(),
            Message::Human(_) => false,
        })
        .collect()
}
