use anyhow::Result;
use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::models::message::{AiMessageChunk, Message};
use crate::models::tool::Tool;
use crate::providers::base::{ChatModel, ChunkStream};

/// One recorded call to the mock model
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
}

/// A mock model that replays pre-configured replies, one per call
pub struct MockChatModel {
    replies: Arc<Mutex<VecDeque<Vec<AiMessageChunk>>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockChatModel {
    /// Create a new mock model with a sequence of replies, each split into chunks
    pub fn new(replies: Vec<Vec<AiMessageChunk>>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<ChunkStream> {
        self.calls.lock().unwrap().push(RecordedCall {
            system: system.to_string(),
            messages: messages.to_vec(),
            tools: tools.iter().map(|tool| tool.name.clone()).collect(),
        });

        // An exhausted script answers with an empty reply
        let chunks = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![AiMessageChunk::new("")]);
        Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }
}
