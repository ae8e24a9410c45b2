//! These models represent the objects passed between the agent, its callers and the model
//!
//! There are several related formats we need to interact with:
//! - chat history sent by the interface, tagged `human` / `ai` / `tool`
//! - events streamed back to the interface while a turn is running
//! - openai messages/tools, sent from the agent to the LLM
//! - retrieved documents, forwarded verbatim inside tool results
//!
//! Incoming data is converted into these structs once, at the edge. Because the
//! history format is produced by many different clients, deserialization is
//! permissive: missing or `null` fields fall back to their empty value.
pub mod content;
pub mod document;
pub mod input;
pub mod message;
pub mod tool;

use serde::{Deserialize, Deserializer};

/// Treat an explicit `null` the same as a missing field
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
