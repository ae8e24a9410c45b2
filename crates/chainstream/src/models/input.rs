use serde::{Deserialize, Serialize};

use super::message::Message;

/// The input for a chat session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputChat {
    /// The chat messages representing the current conversation
    pub messages: Vec<Message>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_id: String,
}

impl InputChat {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }
}

/// Request body wrapping an [`InputChat`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub input: InputChat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    #[default]
    Feedback,
}

/// Feedback for a conversation, accepted as-is and logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub score: f64,
    #[serde(default)]
    pub text: Option<String>,
    pub run_id: String,
    #[serde(default)]
    pub log_type: LogType,
}
