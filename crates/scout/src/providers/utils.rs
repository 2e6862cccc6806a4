use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

use crate::errors::AgentError;
use crate::models::message::{Message, MessageContent};
use crate::models::tool::{Tool, ToolCall};
use crate::providers::base::StopReason;

lazy_static! {
    static ref FUNCTION_NAME_RE: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
}

/// OpenAI restricts function names to [a-zA-Z0-9_-]
pub fn sanitize_function_name(name: &str) -> String {
    FUNCTION_NAME_RE.replace_all(name, "_").to_string()
}

/// Convert internal Message format to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        let mut converted = json!({
            "role": message.role
        });

        let mut output = Vec::new();

        for content in &message.content {
            match content {
                MessageContent::Text(text) => {
                    if !text.is_empty() {
                        converted["content"] = json!(text);
                    }
                }
                MessageContent::ToolRequest(request) => match &request.tool_call {
                    Ok(tool_call) => {
                        let sanitized_name = sanitize_function_name(&tool_call.name);
                        let tool_calls = converted
                            .as_object_mut()
                            .unwrap()
                            .entry("tool_calls")
                            .or_insert(json!([]));

                        tool_calls.as_array_mut().unwrap().push(json!({
                            "id": request.id,
                            "type": "function",
                            "function": {
                                "name": sanitized_name,
                                "arguments": tool_call.arguments.to_string(),
                            }
                        }));
                    }
                    Err(e) => {
                        output.push(json!({
                            "role": "tool",
                            "content": format!("Error: {}", e),
                            "tool_call_id": request.id
                        }));
                    }
                },
                MessageContent::ToolResponse(response) => {
                    output.push(json!({
                        "role": "tool",
                        "content": response.content,
                        "tool_call_id": response.id
                    }));
                }
            }
        }

        if converted.get("content").is_some() || converted.get("tool_calls").is_some() {
            output.insert(0, converted);
        }
        messages_spec.extend(output);
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

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: &Value) -> Result<Message> {
    let original = &response["choices"][0]["message"];
    let mut message = Message::assistant();

    if let Some(text) = original.get("content").and_then(|c| c.as_str()) {
        if !text.is_empty() {
            message = message.with_text(text);
        }
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default().to_string();
            let function_name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            let call = match serde_json::from_str::<Value>(arguments) {
                Ok(params) => Ok(ToolCall::new(function_name, params)),
                Err(e) => Err(AgentError::InvalidParameters(format!(
                    "Could not interpret tool call arguments for {}: {}",
                    function_name, e
                ))),
            };
            message = message.with_tool_request(id, call);
        }
    }

    Ok(message)
}

/// Map OpenAI's finish_reason onto the internal termination signal
pub fn openai_finish_to_stop_reason(response: &Value) -> StopReason {
    match response["choices"][0]["finish_reason"].as_str() {
        Some("tool_calls") | Some("function_call") => StopReason::ToolUse,
        Some("length") => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    }
}
