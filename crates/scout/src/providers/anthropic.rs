use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Completion, Provider, StopReason, Usage};
use super::configs::AnthropicProviderConfig;
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

pub const ANTHROPIC_HOST: &str = "https://api.anthropic.com";

const ANTHROPIC_API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: i32 = 4096;
const MAX_RETRIES: u32 = 2;

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let usage = &data["usage"];
        let input_tokens = usage
            .get("input_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);
        let output_tokens = usage
            .get("output_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);
        let total_tokens = match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        };

        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    fn messages_to_anthropic_spec(messages: &[Message]) -> Vec<Value> {
        let mut anthropic_messages = Vec::new();

        for message in messages {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };

            let mut blocks = Vec::new();
            for content in &message.content {
                match content {
                    MessageContent::Text(text) => {
                        if !text.is_empty() {
                            blocks.push(json!({"type": "text", "text": text}));
                        }
                    }
                    MessageContent::ToolRequest(request) => match &request.tool_call {
                        Ok(tool_call) => blocks.push(json!({
                            "type": "tool_use",
                            "id": request.id,
                            "name": tool_call.name,
                            "input": tool_call.arguments,
                        })),
                        // an invalid request still occupies its slot so the
                        // paired tool_result in the next turn stays well-formed
                        Err(_) => blocks.push(json!({
                            "type": "tool_use",
                            "id": request.id,
                            "name": "unknown",
                            "input": {},
                        })),
                    },
                    MessageContent::ToolResponse(response) => blocks.push(json!({
                        "type": "tool_result",
                        "tool_use_id": response.id,
                        "content": response.content,
                    })),
                }
            }

            if !blocks.is_empty() {
                anthropic_messages.push(json!({
                    "role": role,
                    "content": blocks,
                }));
            }
        }

        anthropic_messages
    }

    fn tools_to_anthropic_spec(tools: &[Tool]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.input_schema,
                })
            })
            .collect()
    }

    fn response_to_message(response: &Value) -> Result<Message> {
        let content = response
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| anyhow!("Invalid response format from Anthropic API"))?;

        let mut message = Message::assistant();
        for block in content {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                        message = message.with_text(text);
                    }
                }
                Some("tool_use") => {
                    let id = block["id"].as_str().unwrap_or_default().to_string();
                    let name = block["name"].as_str().unwrap_or_default().to_string();
                    let input = block.get("input").cloned().unwrap_or(json!({}));
                    message = message.with_tool_request(id, Ok(ToolCall::new(name, input)));
                }
                _ => {}
            }
        }

        Ok(message)
    }

    fn stop_reason(response: &Value) -> StopReason {
        match response.get("stop_reason").and_then(|s| s.as_str()) {
            Some("tool_use") => StopReason::ToolUse,
            Some("max_tokens") => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        }
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));

        let mut attempts = 0;
        loop {
            let response = self
                .client
                .post(&url)
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", ANTHROPIC_API_VERSION)
                .json(&payload)
                .send()
                .await?;

            let status = response.status();
            match status {
                StatusCode::OK => return Ok(response.json().await?),
                status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                    attempts += 1;
                    if attempts > MAX_RETRIES {
                        return Err(anyhow!("Server error: {}", status));
                    }
                    tokio::time::sleep(Duration::from_millis(500 * u64::from(attempts))).await;
                }
                _ => {
                    let error_text = response.text().await?;
                    return Err(anyhow!("Request failed: {} - {}", status, error_text));
                }
            }
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<Completion> {
        let anthropic_messages = Self::messages_to_anthropic_spec(messages);

        let mut payload = json!({
            "model": model,
            "system": system,
            "messages": anthropic_messages,
            "max_tokens": self.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
        });

        if let Some(temp) = self.config.temperature {
            payload
                .as_object_mut()
                .unwrap()
                .insert("temperature".to_string(), json!(temp));
        }

        if !tools.is_empty() {
            payload.as_object_mut().unwrap().insert(
                "tools".to_string(),
                json!(Self::tools_to_anthropic_spec(tools)),
            );
        }

        let response = self.post(payload).await?;

        let message = Self::response_to_message(&response)?;
        let stop_reason = Self::stop_reason(&response);
        let usage = Self::get_usage(&response);

        Ok(Completion::new(message, stop_reason, usage))
    }
}
