use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::{json, Value};

use crate::models::content::MessageContent;
use crate::models::message::{AiMessageChunk, Message};
use crate::models::tool::{Tool, ToolCall};

fn content_to_openai(content: &MessageContent) -> Value {
    match content {
        MessageContent::Text(text) => json!(text),
        MessageContent::Parts(parts) => json!(parts),
        MessageContent::Structured(value) => json!(value.to_string()),
    }
}

/// Tool results must be a string for most openai compatible endpoints
fn tool_content_to_openai(content: &MessageContent) -> Value {
    match content {
        MessageContent::Text(text) => json!(text),
        MessageContent::Parts(parts) => json!(Value::Array(parts.clone()).to_string()),
        MessageContent::Structured(value) => json!(value.to_string()),
    }
}

/// Convert internal Message format to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        match message {
            Message::Human(human) => {
                messages_spec.push(json!({
                    "role": "user",
                    "content": content_to_openai(&human.content),
                }));
            }
            Message::Ai(ai) => {
                let mut converted = json!({"role": "assistant"});
                if !ai.content.is_empty() {
                    converted["content"] = content_to_openai(&ai.content);
                }
                if !ai.tool_calls.is_empty() {
                    let tool_calls: Vec<Value> = ai
                        .tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": sanitize_function_name(&call.name),
                                    "arguments": call.args.to_string(),
                                }
                            })
                        })
                        .collect();
                    converted["tool_calls"] = json!(tool_calls);
                }
                if converted.get("content").is_some() || converted.get("tool_calls").is_some() {
                    messages_spec.push(converted);
                }
            }
            Message::Tool(tool) => {
                messages_spec.push(json!({
                    "role": "tool",
                    "content": tool_content_to_openai(&tool.content),
                    "tool_call_id": tool.tool_call_id,
                }));
            }
        }
    }

    messages_spec
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response into a single reply chunk
///
/// Arguments that are not valid JSON are kept verbatim under `_raw`, so the
/// tool dispatch can report them back to the model.
pub fn openai_response_to_chunk(response: &Value) -> Result<AiMessageChunk> {
    let original = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| anyhow!("No message in response"))?;

    let text = original
        .get("content")
        .and_then(|text| text.as_str())
        .unwrap_or_default();
    let mut chunk = AiMessageChunk::new(MessageContent::text(text));

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default();
            let function_name = tool_call["function"]["name"].as_str().unwrap_or_default();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            let args = match serde_json::from_str::<Value>(arguments) {
                Ok(args) => args,
                Err(e) => {
                    tracing::warn!("Could not interpret tool arguments for id {}: {}", id, e);
                    json!({ "_raw": arguments })
                }
            };
            chunk = chunk.with_tool_call(ToolCall::new(id, function_name, args));
        }
    }

    Ok(chunk)
}

fn sanitize_function_name(name: &str) -> String {
    let re = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    re.replace_all(name, "_").to_string()
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}
