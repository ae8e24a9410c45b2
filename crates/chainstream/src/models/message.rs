use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::content::MessageContent;
use super::nullable;
use super::tool::ToolCall;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HumanMessage {
    #[serde(default, deserialize_with = "nullable")]
    pub content: MessageContent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Assistant turn: text, tool call requests, or both
pub struct AiMessage {
    #[serde(default, deserialize_with = "nullable")]
    pub content: MessageContent,
    #[serde(default, deserialize_with = "nullable")]
    pub tool_calls: Vec<ToolCall>,
    /// Side channel for data that is not part of the conversation itself
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Map::is_empty"
    )]
    pub additional_kwargs: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Result of one tool call, linked to the request by `tool_call_id`
pub struct ToolMessage {
    #[serde(default, deserialize_with = "nullable")]
    pub content: MessageContent,
    #[serde(default, deserialize_with = "nullable")]
    pub tool_call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ToolMessage {
    pub fn new<I: Into<String>, C: Into<MessageContent>>(tool_call_id: I, content: C) -> Self {
        Self {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
            name: None,
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// An incremental fragment of an assistant reply
pub struct AiMessageChunk {
    #[serde(default, deserialize_with = "nullable")]
    pub content: MessageContent,
    /// Complete tool calls carried by this fragment, if any
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl AiMessageChunk {
    pub fn new<C: Into<MessageContent>>(content: C) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_call(mut self, tool_call: ToolCall) -> Self {
        self.tool_calls.push(tool_call);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
/// One turn of a conversation
pub enum Message {
    Human(HumanMessage),
    Ai(AiMessage),
    Tool(ToolMessage),
}

impl Message {
    /// Create a new user message
    pub fn human<C: Into<MessageContent>>(content: C) -> Self {
        Message::Human(HumanMessage {
            content: content.into(),
        })
    }

    /// Create a new assistant message without tool calls
    pub fn ai<C: Into<MessageContent>>(content: C) -> Self {
        Message::Ai(AiMessage {
            content: content.into(),
            ..Default::default()
        })
    }

    /// Create a new tool result message
    pub fn tool<I: Into<String>, C: Into<MessageContent>>(tool_call_id: I, content: C) -> Self {
        Message::Tool(ToolMessage::new(tool_call_id, content))
    }

    /// Add a tool call request. Only assistant messages carry tool calls, other
    /// variants are returned unchanged.
    pub fn with_tool_call(mut self, tool_call: ToolCall) -> Self {
        if let Message::Ai(ai) = &mut self {
            ai.tool_calls.push(tool_call);
        }
        self
    }

    /// The `type` tag used on the wire
    pub fn message_type(&self) -> &'static str {
        match self {
            Message::Human(_) => "human",
            Message::Ai(_) => "ai",
            Message::Tool(_) => "tool",
        }
    }

    pub fn content(&self) -> &MessageContent {
        match self {
            Message::Human(m) => &m.content,
            Message::Ai(m) => &m.content,
            Message::Tool(m) => &m.content,
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Ai(m) => &m.tool_calls,
            _ => &[],
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }

    pub fn as_ai(&self) -> Option<&AiMessage> {
        match self {
            Message::Ai(m) => Some(m),
            _ => None,
        }
    }

    /// Get the text content if the content is plain text
    pub fn as_text(&self) -> Option<&str> {
        self.content().as_text()
    }
}

impl From<AiMessage> for Message {
    fn from(message: AiMessage) -> Self {
        Message::Ai(message)
    }
}

impl From<ToolMessage> for Message {
    fn from(message: ToolMessage) -> Self {
        Message::Tool(message)
    }
}
