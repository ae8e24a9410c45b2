//! Events emitted while an agent answers one turn
//!
//! A step function yields an ordered sequence of [`Event`]s: tool invocations
//! starting and ending, and fragments of the model reply. Every event flattens
//! to a plain JSON map through [`Event::to_mapping`], which is the shape
//! forwarded to streaming clients.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::errors::{ChainError, ChainResult};
use crate::models::content::MessageContent;
use crate::models::document::Document;
use crate::models::message::{AiMessageChunk, ToolMessage};

pub const DEFAULT_EVENT_NAME: &str = "custom_chain_event";

pub const ON_TOOL_START: &str = "on_tool_start";
pub const ON_TOOL_END: &str = "on_tool_end";
pub const ON_CHAT_MODEL_STREAM: &str = "on_chat_model_stream";
pub const END: &str = "end";

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Input and result of one completed tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolData {
    #[serde(default)]
    pub input: Map<String, Value>,
    pub output: ToolMessage,
}

impl ToolData {
    pub fn new(input: Map<String, Value>, output: ToolMessage) -> Self {
        Self { input, output }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatModelStreamData {
    pub chunk: AiMessageChunk,
}

/// The variant-specific part of an [`Event`]
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    ToolStart {
        input: Map<String, Value>,
        id: String,
    },
    ToolEnd {
        id: String,
        data: ToolData,
    },
    ChatModelStream {
        data: ChatModelStreamData,
    },
    End,
    /// Envelope for anything outside the taxonomy, such as stream metadata
    Custom {
        event: String,
        data: Map<String, Value>,
    },
}

impl EventKind {
    /// The `event` discriminator
    pub fn tag(&self) -> &str {
        match self {
            EventKind::ToolStart { .. } => ON_TOOL_START,
            EventKind::ToolEnd { .. } => ON_TOOL_END,
            EventKind::ChatModelStream { .. } => ON_CHAT_MODEL_STREAM,
            EventKind::End => END,
            EventKind::Custom { event, .. } => event,
        }
    }
}

/// One increment of agent execution
///
/// Events are immutable once built: the constructors and `with_*` builders are
/// the only way to set their fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    name: String,
    kind: EventKind,
    extra: Map<String, Value>,
}

impl Event {
    fn from_kind(kind: EventKind) -> Self {
        Self {
            name: DEFAULT_EVENT_NAME.to_string(),
            kind,
            extra: Map::new(),
        }
    }

    /// A tool invocation was dispatched; gets a fresh id
    pub fn tool_start(input: Map<String, Value>) -> Self {
        Self::tool_start_with_id(new_id(), input)
    }

    pub fn tool_start_with_id<S: Into<String>>(id: S, input: Map<String, Value>) -> Self {
        Self::from_kind(EventKind::ToolStart {
            input,
            id: id.into(),
        })
    }

    /// A tool invocation completed; gets a fresh id
    pub fn tool_end(data: ToolData) -> Self {
        Self::tool_end_with_id(new_id(), data)
    }

    /// A tool invocation completed, closing the [`Event::tool_start`] with the same id
    pub fn tool_end_with_id<S: Into<String>>(id: S, data: ToolData) -> Self {
        Self::from_kind(EventKind::ToolEnd {
            id: id.into(),
            data,
        })
    }

    pub fn chat_model_stream(chunk: AiMessageChunk) -> Self {
        Self::from_kind(EventKind::ChatModelStream {
            data: ChatModelStreamData { chunk },
        })
    }

    /// Shorthand for a stream event carrying only text
    pub fn text_chunk<S: Into<String>>(text: S) -> Self {
        Self::chat_model_stream(AiMessageChunk::new(MessageContent::text(text)))
    }

    pub fn end() -> Self {
        Self::from_kind(EventKind::End)
    }

    pub fn custom<S: Into<String>>(event: S, data: Map<String, Value>) -> Self {
        Self::from_kind(EventKind::Custom {
            event: event.into(),
            data,
        })
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Attach an ad-hoc field. Extra fields never shadow the declared ones.
    pub fn with_extra<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn into_kind(self) -> EventKind {
        self.kind
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    pub fn event_type(&self) -> &str {
        self.kind.tag()
    }

    /// Id of a tool start or tool end event
    pub fn id(&self) -> Option<&str> {
        match &self.kind {
            EventKind::ToolStart { id, .. } | EventKind::ToolEnd { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Flatten into a plain JSON map: `event`, `name`, the declared fields and
    /// any extra fields
    pub fn to_mapping(&self) -> Map<String, Value> {
        let mut map = self.extra.clone();
        map.insert("event".to_string(), json!(self.kind.tag()));
        map.insert("name".to_string(), json!(self.name));

        match &self.kind {
            EventKind::ToolStart { input, id } => {
                map.insert("input".to_string(), Value::Object(input.clone()));
                map.insert("id".to_string(), json!(id));
            }
            EventKind::ToolEnd { id, data } => {
                map.insert("id".to_string(), json!(id));
                map.insert(
                    "data".to_string(),
                    serde_json::to_value(data).unwrap_or_default(),
                );
            }
            EventKind::ChatModelStream { data } => {
                map.insert(
                    "data".to_string(),
                    serde_json::to_value(data).unwrap_or_default(),
                );
            }
            EventKind::End => {}
            EventKind::Custom { data, .. } => {
                map.insert("data".to_string(), Value::Object(data.clone()));
            }
        }
        map
    }

    /// Normalize a plain JSON map into the canonical event form
    ///
    /// Keys that are not part of the variant are kept as extra fields. Missing
    /// ids get a fresh one, a missing name falls back to the default.
    pub fn from_mapping(value: Value) -> ChainResult<Self> {
        let Value::Object(mut map) = value else {
            return Err(ChainError::MalformedEvent(
                "expected a JSON object".to_string(),
            ));
        };

        let event = match map.remove("event") {
            Some(Value::String(event)) => event,
            _ => {
                return Err(ChainError::MalformedEvent(
                    "missing `event` discriminator".to_string(),
                ))
            }
        };

        let name = match map.remove("name") {
            None | Some(Value::Null) => DEFAULT_EVENT_NAME.to_string(),
            Some(Value::String(name)) => name,
            Some(other) => {
                return Err(ChainError::MalformedEvent(format!(
                    "`name` must be a string, got {}",
                    other
                )))
            }
        };

        let kind = match event.as_str() {
            ON_TOOL_START => EventKind::ToolStart {
                input: take_or_default(&mut map, "input")?,
                id: take_id(&mut map)?,
            },
            ON_TOOL_END => EventKind::ToolEnd {
                id: take_id(&mut map)?,
                data: take(&mut map, "data")?,
            },
            ON_CHAT_MODEL_STREAM => EventKind::ChatModelStream {
                data: take(&mut map, "data")?,
            },
            END => EventKind::End,
            other => EventKind::Custom {
                event: other.to_string(),
                data: take_or_default(&mut map, "data")?,
            },
        };

        Ok(Self {
            name,
            kind,
            extra: map,
        })
    }
}

fn take<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> ChainResult<T> {
    let value = map
        .remove(key)
        .ok_or_else(|| ChainError::MalformedEvent(format!("missing `{}`", key)))?;
    serde_json::from_value(value)
        .map_err(|e| ChainError::MalformedEvent(format!("invalid `{}`: {}", key, e)))
}

fn take_or_default<T: DeserializeOwned + Default>(
    map: &mut Map<String, Value>,
    key: &str,
) -> ChainResult<T> {
    match map.get(key) {
        None | Some(Value::Null) => {
            map.remove(key);
            Ok(T::default())
        }
        Some(_) => take(map, key),
    }
}

fn take_id(map: &mut Map<String, Value>) -> ChainResult<String> {
    match map.remove("id") {
        None | Some(Value::Null) => Ok(new_id()),
        Some(Value::String(id)) => Ok(id),
        Some(other) => Err(ChainError::MalformedEvent(format!(
            "`id` must be a string, got {}",
            other
        ))),
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_mapping().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Event::from_mapping(value).map_err(serde::de::Error::custom)
    }
}

/// Build a tool end event from a retrieval that did not go through a model
/// tool call
///
/// The tool message content is the ordered list of document mappings and the
/// recorded input is `{"query": query}`.
pub fn make_retrieval_tool_end(query: &str, docs: &[Document]) -> Event {
    make_retrieval_tool_end_with(query, docs, "retriever", "retriever")
}

pub fn make_retrieval_tool_end_with(
    query: &str,
    docs: &[Document],
    tool_call_id: &str,
    name: &str,
) -> Event {
    let output = ToolMessage::new(
        tool_call_id,
        MessageContent::parts(docs.iter().map(Document::to_mapping).collect()),
    )
    .with_name(name);

    let mut input = Map::new();
    input.insert("query".to_string(), json!(query));

    Event::tool_end(ToolData::new(input, output))
}
