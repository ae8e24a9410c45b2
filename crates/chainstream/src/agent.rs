use std::sync::Arc;

use futures::StreamExt;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::chain::{EventStream, StepFn};
use crate::events::{make_retrieval_tool_end, Event, ToolData};
use crate::history::extract_human_ai_messages;
use crate::models::content::MessageContent;
use crate::models::input::InputChat;
use crate::models::message::{AiMessage, AiMessageChunk, Message, ToolMessage};
use crate::models::tool::ToolCall;
use crate::prompt_template::{format_docs, SYSTEM_INSTRUCTION};
use crate::providers::base::ChatModel;
use crate::tools::Toolbox;

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Upper bound on model calls for one turn
    pub max_turns: usize,
    /// Retrieve with the latest user message before the first model call
    pub pre_retrieve: bool,
    pub system_prompt: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            pre_retrieve: false,
            system_prompt: SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

/// Retrieval-augmented agent answering one chat turn as a stream of events
///
/// Each turn calls the model with the conversational part of the history
/// and runs the tools it asks for until it replies without tool calls.
/// Text is forwarded as chat model stream events, each tool round as a tool
/// start / tool end pair sharing the tool call id.
#[derive(Clone)]
pub struct RagAgent {
    model: Arc<dyn ChatModel>,
    toolbox: Arc<Toolbox>,
    config: AgentConfig,
}

impl RagAgent {
    pub fn new(model: Arc<dyn ChatModel>, toolbox: Arc<Toolbox>) -> Self {
        Self {
            model,
            toolbox,
            config: AgentConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn dispatch_tool_call(&self, tool_call: ToolCall) -> ToolMessage {
        let content = match self.toolbox.call(&tool_call).await {
            Ok(output) => output.to_string(),
            Err(e) => {
                tracing::warn!(tool = %tool_call.name, "Tool call failed: {}", e);
                format!("Error: {}", e)
            }
        };
        ToolMessage::new(tool_call.id, content).with_name(tool_call.name)
    }
}

fn tool_input(args: &Value) -> Map<String, Value> {
    match args {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("input".to_string(), other.clone());
            map
        }
    }
}

fn last_human_text(messages: &[Message]) -> Option<String> {
    messages.iter().rev().find_map(|message| match message {
        Message::Human(human) => human.content.as_text().map(str::to_string),
        _ => None,
    })
}

impl StepFn<InputChat> for RagAgent {
    fn run(&self, input: InputChat) -> EventStream<'static> {
        let agent = self.clone();

        Box::pin(async_stream::try_stream! {
            let mut messages = extract_human_ai_messages(input.messages);
            let mut system_prompt = agent.config.system_prompt.clone();
            let tools = agent.toolbox.tools().to_vec();

            if agent.config.pre_retrieve {
                if let Some(query) = last_human_text(&messages) {
                    match agent.toolbox.retrieve(&query).await {
                        Ok(docs) => {
                            let context = format_docs(&docs)?;
                            system_prompt = format!("{}\n\n{}", system_prompt, context);
                            yield make_retrieval_tool_end(&query, &docs);
                        }
                        Err(e) => tracing::warn!("Pre-retrieval failed: {}", e),
                    }
                }
            }

            let mut finished = false;
            for turn in 0..agent.config.max_turns {
                tracing::debug!(turn, messages = messages.len(), "calling model");
                let mut chunks = agent.model.stream(&system_prompt, &messages, &tools).await?;

                let mut text = String::new();
                let mut tool_calls: Vec<ToolCall> = Vec::new();
                while let Some(chunk) = chunks.next().await {
                    let chunk = chunk?;
                    if let Some(delta) = chunk.content.as_text() {
                        text.push_str(delta);
                    }
                    tool_calls.extend(chunk.tool_calls);
                    if !chunk.content.is_empty() {
                        yield Event::chat_model_stream(AiMessageChunk::new(chunk.content));
                    }
                }

                if tool_calls.is_empty() {
                    finished = true;
                    break;
                }

                for call in tool_calls.iter_mut().filter(|call| call.id.is_empty()) {
                    call.id = Uuid::new_v4().to_string();
                }

                messages.push(Message::Ai(AiMessage {
                    content: MessageContent::Text(text),
                    tool_calls: tool_calls.clone(),
                    additional_kwargs: Map::new(),
                }));

                for call in &tool_calls {
                    yield Event::tool_start_with_id(&call.id, tool_input(&call.args))
                        .with_name(&call.name);
                }

                // Dispatch in parallel, report in request order
                let outputs = futures::future::join_all(
                    tool_calls.iter().map(|call| agent.dispatch_tool_call(call.clone())),
                )
                .await;

                for (call, output) in tool_calls.iter().zip(outputs) {
                    let data = ToolData::new(tool_input(&call.args), output.clone());
                    yield Event::tool_end_with_id(&call.id, data).with_name(&call.name);
                    messages.push(Message::Tool(output));
                }
            }

            if !finished {
                tracing::warn!(max_turns = agent.config.max_turns, "Turn limit reached");
                let mut data = Map::new();
                data.insert("max_turns".to_string(), json!(agent.config.max_turns));
                yield Event::custom("turn_limit", data);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::CustomChain;
    use crate::events::{EventKind, ON_CHAT_MODEL_STREAM, ON_TOOL_END, ON_TOOL_START};
    use crate::models::document::Document;
    use crate::providers::mock::MockChatModel;
    use crate::tools::{InMemoryRetriever, PageFetcher, RETRIEVE_DOCS, RETRIEVE_URL};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use futures::TryStreamExt;

    struct StaticFetcher;

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch_text(&self, url: &str) -> Result<String> {
            if url.contains("down") {
                return Err(anyhow!("connection refused"));
            }
            Ok("page text".to_string())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl ChatModel for FailingModel {
        async fn stream(
            &self,
            _system: &str,
            _messages: &[Message],
            _tools: &[crate::models::tool::Tool],
        ) -> Result<crate::providers::base::ChunkStream> {
            Err(anyhow!("quota exceeded"))
        }
    }

    fn toolbox() -> Arc<Toolbox> {
        let docs = vec![
            Document::new("Monitor model drift in production"),
            Document::new("Feature stores"),
        ];
        Arc::new(Toolbox::new(
            Arc::new(InMemoryRetriever::new(docs, 1)),
            Arc::new(StaticFetcher),
        ))
    }

    fn history() -> InputChat {
        InputChat::new(vec![
            Message::human("Hi"),
            Message::ai("").with_tool_call(ToolCall::new("old", RETRIEVE_DOCS, json!({}))),
            Message::tool("old", "stale"),
            Message::ai("Hello!"),
            Message::human("How do I watch for drift?"),
        ])
    }

    async fn run(agent: &RagAgent, input: InputChat) -> Result<Vec<Event>> {
        agent.run(input).try_collect().await
    }

    #[tokio::test]
    async fn test_plain_reply() -> Result<()> {
        let model = Arc::new(MockChatModel::new(vec![vec![
            AiMessageChunk::new("Use "),
            AiMessageChunk::new("monitoring."),
        ]]));
        let agent = RagAgent::new(model.clone(), toolbox());

        let events = run(&agent, history()).await?;
        let types: Vec<_> = events.iter().map(Event::event_type).collect();
        assert_eq!(types, vec![ON_CHAT_MODEL_STREAM, ON_CHAT_MODEL_STREAM]);

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system, SYSTEM_INSTRUCTION);
        assert_eq!(calls[0].tools, vec![RETRIEVE_DOCS, RETRIEVE_URL]);
        // Tool plumbing from earlier turns is not sent back to the model
        assert_eq!(calls[0].messages.len(), 3);
        assert!(calls[0].messages.iter().all(|m| !m.has_tool_calls()));
        Ok(())
    }

    #[tokio::test]
    async fn test_tool_round_pairs_ids() -> Result<()> {
        let model = Arc::new(MockChatModel::new(vec![
            vec![AiMessageChunk::new("")
                .with_tool_call(ToolCall::new("c1", RETRIEVE_DOCS, json!({"query": "drift"})))
                .with_tool_call(ToolCall::new("c2", RETRIEVE_URL, json!({"url": "https://x.io"})))],
            vec![AiMessageChunk::new("Done")],
        ]));
        let agent = RagAgent::new(model.clone(), toolbox());

        let events = run(&agent, history()).await?;
        let types: Vec<_> = events.iter().map(Event::event_type).collect();
        assert_eq!(
            types,
            vec![
                ON_TOOL_START,
                ON_TOOL_START,
                ON_TOOL_END,
                ON_TOOL_END,
                ON_CHAT_MODEL_STREAM
            ]
        );
        assert_eq!(events[0].id(), Some("c1"));
        assert_eq!(events[1].id(), Some("c2"));
        assert_eq!(events[2].id(), Some("c1"));
        assert_eq!(events[3].id(), Some("c2"));
        assert_eq!(events[0].name(), RETRIEVE_DOCS);

        match events[2].kind() {
            EventKind::ToolEnd { data, .. } => {
                assert_eq!(data.input, tool_input(&json!({"query": "drift"})));
                assert_eq!(data.output.tool_call_id, "c1");
                let content = data.output.content.as_text().unwrap();
                assert!(content.contains("Monitor model drift"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // Second call sees the dispatch record and both results
        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        let followup = &calls[1].messages;
        assert_eq!(followup.len(), 6);
        assert!(followup[3].has_tool_calls());
        assert_eq!(followup[4].message_type(), "tool");
        assert_eq!(followup[5].message_type(), "tool");
        Ok(())
    }

    #[tokio::test]
    async fn test_tool_failure_becomes_tool_message() -> Result<()> {
        let model = Arc::new(MockChatModel::new(vec![
            vec![AiMessageChunk::new("").with_tool_call(ToolCall::new(
                "c1",
                RETRIEVE_URL,
                json!({"url": "https://down.example"}),
            ))],
            vec![AiMessageChunk::new("Sorry, the page is unavailable.")],
        ]));
        let agent = RagAgent::new(model, toolbox());

        let events = run(&agent, history()).await?;
        match events[1].kind() {
            EventKind::ToolEnd { data, .. } => {
                let content = data.output.content.as_text().unwrap();
                assert!(content.starts_with("Error:"));
                assert!(content.contains("connection refused"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(events.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_tool_call_id_is_generated() -> Result<()> {
        let model = Arc::new(MockChatModel::new(vec![
            vec![AiMessageChunk::new("").with_tool_call(ToolCall::new(
                "",
                RETRIEVE_DOCS,
                json!({"query": "drift"}),
            ))],
            vec![AiMessageChunk::new("ok")],
        ]));
        let agent = RagAgent::new(model, toolbox());

        let events = run(&agent, history()).await?;
        let start = events[0].id().unwrap();
        assert!(!start.is_empty());
        assert_eq!(events[1].id(), Some(start));
        Ok(())
    }

    #[tokio::test]
    async fn test_pre_retrieve_injects_context() -> Result<()> {
        let model = Arc::new(MockChatModel::new(vec![vec![AiMessageChunk::new("ok")]]));
        let agent = RagAgent::new(model.clone(), toolbox()).with_config(AgentConfig {
            pre_retrieve: true,
            ..Default::default()
        });

        let events = run(&agent, history()).await?;
        assert_eq!(events[0].event_type(), ON_TOOL_END);
        match events[0].kind() {
            EventKind::ToolEnd { data, .. } => {
                assert_eq!(data.input["query"], "How do I watch for drift?");
                assert_eq!(data.output.tool_call_id, "retriever");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let system = &model.calls()[0].system;
        assert!(system.starts_with(SYSTEM_INSTRUCTION));
        assert!(system.contains("## Context provided:"));
        assert!(system.contains("Monitor model drift in production"));
        Ok(())
    }

    #[tokio::test]
    async fn test_turn_limit() -> Result<()> {
        let dispatch = || {
            vec![AiMessageChunk::new("").with_tool_call(ToolCall::new(
                "c",
                RETRIEVE_DOCS,
                json!({"query": "drift"}),
            ))]
        };
        let model = Arc::new(MockChatModel::new(vec![dispatch(), dispatch(), dispatch()]));
        let agent = RagAgent::new(model.clone(), toolbox()).with_config(AgentConfig {
            max_turns: 2,
            ..Default::default()
        });

        let events = run(&agent, history()).await?;
        assert_eq!(model.calls().len(), 2);
        assert_eq!(events.last().unwrap().event_type(), "turn_limit");
        Ok(())
    }

    #[tokio::test]
    async fn test_model_failure_aborts_stream() {
        let agent = RagAgent::new(Arc::new(FailingModel), toolbox());

        let err = run(&agent, history()).await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_invoke_through_chain() -> Result<()> {
        let model = Arc::new(MockChatModel::new(vec![
            vec![AiMessageChunk::new("").with_tool_call(ToolCall::new(
                "c1",
                RETRIEVE_DOCS,
                json!({"query": "drift"}),
            ))],
            vec![AiMessageChunk::new("Watch "), AiMessageChunk::new("drift.")],
        ]));
        let chain = CustomChain::new(RagAgent::new(model, toolbox()));

        let message = chain.invoke(history()).await?;
        let ai = message.as_ai().unwrap();
        assert_eq!(ai.content, MessageContent::text("Watch drift."));
        let data = ai.additional_kwargs["tool_calls_data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["output"]["tool_call_id"], "c1");
        Ok(())
    }
}
