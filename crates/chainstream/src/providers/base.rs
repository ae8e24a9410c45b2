use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::models::message::{AiMessageChunk, Message};
use crate::models::tool::Tool;

/// Fragments of one model reply, in the order they were produced
pub type ChunkStream = BoxStream<'static, Result<AiMessageChunk>>;

/// Base trait for hosted chat models (OpenAI compatible endpoints, test doubles, etc)
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate the next assistant reply as a stream of chunks. Tool calls are
    /// carried complete on the chunks that request them.
    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<ChunkStream>;
}
