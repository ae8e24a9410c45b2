use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced by [`crate::chain::CustomChain`] while folding a turn
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Chunk content must be a string, got {0}")]
    ContentType(String),

    #[error("Step function failed: {0}")]
    Step(#[source] anyhow::Error),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),
}

pub type ChainResult<T> = Result<T, ChainError>;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}

pub type ToolResult<T> = Result<T, ToolError>;
