//! Dual-mode wrapper around an agent step function
//!
//! A step function produces the events of one turn as a lazy stream.
//! [`CustomChain`] exposes that stream two ways: forwarded event by event as
//! plain JSON maps, or folded into a single assistant message.
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::{json, Map, Value};
use tracing::Instrument;

use crate::errors::{ChainError, ChainResult};
use crate::events::{Event, EventKind, ToolData};
use crate::instrumentation::{Instrumentation, NoopInstrumentation};
use crate::models::content::MessageContent;
use crate::models::message::{AiMessage, Message};

/// The lazy, finite, non-restartable event sequence of one turn
pub type EventStream<'a> = BoxStream<'a, anyhow::Result<Event>>;

/// A producer of the events for one turn, given its arguments
pub trait StepFn<A>: Send + Sync {
    fn run(&self, args: A) -> EventStream<'static>;
}

impl<A, F> StepFn<A> for F
where
    F: Fn(A) -> EventStream<'static> + Send + Sync,
{
    fn run(&self, args: A) -> EventStream<'static> {
        self(args)
    }
}

/// The fold of one complete event sequence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedResult {
    /// Every streamed chunk text, in emission order
    pub content: String,
    /// Every tool end payload, in emission order
    pub tool_calls: Vec<ToolData>,
}

impl AggregatedResult {
    /// Wrap into the outgoing assistant message. The tool calls travel in
    /// `additional_kwargs.tool_calls_data`.
    pub fn into_message(self) -> Message {
        let mut additional_kwargs = Map::new();
        additional_kwargs.insert(
            "tool_calls_data".to_string(),
            serde_json::to_value(&self.tool_calls).unwrap_or_else(|_| json!([])),
        );

        Message::Ai(AiMessage {
            content: MessageContent::Text(self.content),
            tool_calls: Vec::new(),
            additional_kwargs,
        })
    }
}

/// Drain an event stream, concatenating chunk text and collecting tool results
///
/// Fails on the first chunk whose content is not text, or on the first error
/// yielded by the stream. Nothing folded so far is returned in that case.
pub async fn aggregate<S>(events: S) -> ChainResult<AggregatedResult>
where
    S: Stream<Item = anyhow::Result<Event>>,
{
    futures::pin_mut!(events);
    let mut result = AggregatedResult::default();

    while let Some(event) = events.next().await {
        match event.map_err(ChainError::Step)?.into_kind() {
            EventKind::ChatModelStream { data } => match data.chunk.content {
                MessageContent::Text(text) => result.content.push_str(&text),
                other => return Err(ChainError::ContentType(other.kind().to_string())),
            },
            EventKind::ToolEnd { data, .. } => result.tool_calls.push(data),
            _ => {}
        }
    }

    Ok(result)
}

/// Wraps a step function; holds no per-call state, so one instance can serve
/// concurrent turns
pub struct CustomChain<F> {
    name: String,
    step: F,
    instrumentation: Arc<dyn Instrumentation>,
}

impl<F> CustomChain<F> {
    pub fn new(step: F) -> Self {
        Self {
            name: "custom_chain".to_string(),
            step,
            instrumentation: Arc::new(NoopInstrumentation),
        }
    }

    /// Name given to the workflow span
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_instrumentation(mut self, instrumentation: Arc<dyn Instrumentation>) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the step function directly, without any event processing
    pub fn call<A>(&self, args: A) -> EventStream<'static>
    where
        F: StepFn<A>,
    {
        self.step.run(args)
    }

    /// Forward each event as a plain JSON map, in emission order
    ///
    /// With instrumentation active, the whole call runs under one workflow
    /// span. Dropping the returned stream stops pulling from the step function.
    pub fn stream_events<A>(
        &self,
        args: A,
    ) -> BoxStream<'static, anyhow::Result<Map<String, Value>>>
    where
        F: StepFn<A>,
    {
        let span = match self.instrumentation.workflow_span(&self.name) {
            Ok(span) => span,
            Err(e) => {
                tracing::warn!("Instrumentation unavailable for {}: {}", self.name, e);
                None
            }
        };

        let mut events = match &span {
            Some(span) => span.in_scope(|| self.step.run(args)),
            None => self.step.run(args),
        };

        Box::pin(async_stream::try_stream! {
            loop {
                let next = match &span {
                    Some(span) => events.next().instrument(span.clone()).await,
                    None => events.next().await,
                };
                let Some(event) = next else {
                    break;
                };
                let event = event?;
                tracing::debug!(event = event.event_type(), "forwarding event");
                yield event.to_mapping();
            }
        })
    }

    /// Drain the step function and return one assistant message
    pub async fn invoke<A>(&self, args: A) -> ChainResult<Message>
    where
        F: StepFn<A>,
    {
        let result = aggregate(self.step.run(args)).await?;
        tracing::debug!(
            content_len = result.content.len(),
            tool_calls = result.tool_calls.len(),
            "aggregated turn"
        );
        Ok(result.into_message())
    }

    /// [`CustomChain::invoke`] for synchronous callers, blocking the current
    /// thread until the sequence is exhausted
    ///
    /// The step function must not depend on a runtime reactor (for example a
    /// tokio-driven HTTP client); call `invoke` from async code instead.
    pub fn invoke_blocking<A>(&self, args: A) -> ChainResult<Message>
    where
        F: StepFn<A>,
    {
        futures::executor::block_on(self.invoke(args))
    }
}
