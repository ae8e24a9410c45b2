use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chainstream::agent::RagAgent;
use chainstream::chain::CustomChain;
use chainstream::models::content::MessageContent;
use chainstream::models::document::Document;
use chainstream::models::message::{AiMessageChunk, Message};
use chainstream::models::tool::{Tool, ToolCall};
use chainstream::providers::base::{ChatModel, ChunkStream};
use chainstream::tools::{InMemoryRetriever, PageFetcher, Toolbox, RETRIEVE_DOCS};
use chainstream_server::routes;
use chainstream_server::state::AppState;
use futures::stream;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

/// Answers with a fixed reply, or runs one retrieval first when the last
/// message is not a tool result yet
struct ScriptedModel {
    reply: Vec<AiMessageChunk>,
    retrieve_first: bool,
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn stream(
        &self,
        _system: &str,
        messages: &[Message],
        _tools: &[Tool],
    ) -> Result<ChunkStream> {
        let answered = matches!(messages.last(), Some(Message::Tool(_)));
        let chunks = if self.retrieve_first && !answered {
            vec![AiMessageChunk::new("").with_tool_call(ToolCall::new(
                "call-1",
                RETRIEVE_DOCS,
                json!({"query": "drift"}),
            ))]
        } else {
            self.reply.clone()
        };
        Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }
}

struct BrokenModel;

#[async_trait]
impl ChatModel for BrokenModel {
    async fn stream(
        &self,
        _system: &str,
        _messages: &[Message],
        _tools: &[Tool],
    ) -> Result<ChunkStream> {
        Err(anyhow!("upstream unavailable"))
    }
}

struct NoFetcher;

#[async_trait]
impl PageFetcher for NoFetcher {
    async fn fetch_text(&self, _url: &str) -> Result<String> {
        Err(anyhow!("offline"))
    }
}

fn app(model: Arc<dyn ChatModel>) -> Router {
    let retriever = InMemoryRetriever::new(vec![Document::new("Monitor drift daily")], 2);
    let toolbox = Arc::new(Toolbox::new(Arc::new(retriever), Arc::new(NoFetcher)));
    let chain = CustomChain::new(RagAgent::new(model, toolbox));
    routes::configure(AppState::new(chain))
}

fn text_model(parts: &[&str], retrieve_first: bool) -> Arc<dyn ChatModel> {
    Arc::new(ScriptedModel {
        reply: parts.iter().map(|part| AiMessageChunk::new(*part)).collect(),
        retrieve_first,
    })
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn chat_input() -> Value {
    json!({
        "input": {
            "messages": [
                {"type": "human", "content": "How do I watch for drift?"}
            ],
            "user_id": "u1",
            "session_id": "s1"
        }
    })
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn records(body: &str) -> Vec<Value> {
    body.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_stream_events() {
    let response = app(text_model(&["Watch ", "drift."], true))
        .oneshot(post_json("/stream_events", chat_input()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/event-stream"
    );

    let records = records(&body_string(response).await);
    let events: Vec<_> = records
        .iter()
        .map(|record| record["event"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        events,
        vec![
            "metadata",
            "on_tool_start",
            "on_tool_end",
            "on_chat_model_stream",
            "on_chat_model_stream",
            "end"
        ]
    );

    assert!(records[0]["data"]["run_id"].as_str().is_some());
    assert_eq!(records[1]["id"], "call-1");
    assert_eq!(records[2]["id"], "call-1");
    assert_eq!(records[2]["data"]["input"], json!({"query": "drift"}));
    assert_eq!(records[3]["data"]["chunk"]["content"], "Watch ");
    assert_eq!(records[3]["name"], "custom_chain_event");
}

#[tokio::test]
async fn test_stream_events_error_record() {
    let response = app(Arc::new(BrokenModel))
        .oneshot(post_json("/stream_events", chat_input()))
        .await
        .unwrap();

    let records = records(&body_string(response).await);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["event"], "metadata");
    assert_eq!(records[1]["event"], "error");
    assert!(records[1]["data"]["message"]
        .as_str()
        .unwrap()
        .contains("upstream unavailable"));
}

#[tokio::test]
async fn test_invoke() {
    let response = app(text_model(&["Hel", "lo"], true))
        .oneshot(post_json("/invoke", chat_input()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let message: Message = serde_json::from_str(&body_string(response).await).unwrap();
    let ai = message.as_ai().unwrap();
    assert_eq!(ai.content, MessageContent::text("Hello"));

    let data = ai.additional_kwargs["tool_calls_data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["output"]["tool_call_id"], "call-1");
}

#[tokio::test]
async fn test_invoke_rejects_structured_chunk() {
    let model = Arc::new(ScriptedModel {
        reply: vec![
            AiMessageChunk::new("partial"),
            AiMessageChunk::new(MessageContent::Structured(json!({"k": "v"}))),
        ],
        retrieve_first: false,
    });

    let response = app(model)
        .oneshot(post_json("/invoke", chat_input()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert!(body["error"].as_str().unwrap().contains("must be a string"));
}

#[tokio::test]
async fn test_invoke_bad_request() {
    let response = app(text_model(&["unused"], false))
        .oneshot(post_json("/invoke", json!({"messages": []})))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_feedback() {
    let response = app(text_model(&[], false))
        .oneshot(post_json(
            "/feedback",
            json!({"score": 5, "text": "Great answer", "run_id": "run-1"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body, json!({"status": "success"}));
}

#[tokio::test]
async fn test_status() {
    let response = app(text_model(&[], false))
        .oneshot(
            Request::builder()
                .uri("/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");
}
