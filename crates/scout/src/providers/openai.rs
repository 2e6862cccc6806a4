use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Completion, Provider, Usage};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    messages_to_openai_spec, openai_finish_to_stop_reason, openai_response_to_message,
    tools_to_openai_spec,
};
use crate::models::message::Message;
use crate::models::tool::Tool;

pub const OPENAI_HOST: &str = "https://api.openai.com";

const MAX_RETRIES: u32 = 2;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let usage = &data["usage"];

        let input_tokens = usage
            .get("prompt_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let output_tokens = usage
            .get("completion_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let total_tokens = usage
            .get("total_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32)
            .or_else(|| match (input_tokens, output_tokens) {
                (Some(input), Some(output)) => Some(input + output),
                _ => None,
            });

        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let mut attempts = 0;
        loop {
            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.config.api_key))
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
impl Provider for OpenAiProvider {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<Completion> {
        let system_message = json!({
            "role": "system",
            "content": system
        });

        let messages_spec = messages_to_openai_spec(messages);
        let tools_spec = if !tools.is_empty() {
            tools_to_openai_spec(tools)?
        } else {
            vec![]
        };

        let mut messages_array = vec![system_message];
        messages_array.extend(messages_spec);

        let mut payload = json!({
            "model": model,
            "messages": messages_array
        });

        if !tools_spec.is_empty() {
            payload
                .as_object_mut()
                .unwrap()
                .insert("tools".to_string(), json!(tools_spec));
        }
        if let Some(temp) = self.config.temperature {
            payload
                .as_object_mut()
                .unwrap()
                .insert("temperature".to_string(), json!(temp));
        }
        if let Some(tokens) = self.config.max_tokens {
            payload
                .as_object_mut()
                .unwrap()
                .insert("max_tokens".to_string(), json!(tokens));
        }

        let response = self.post(payload).await?;

        if let Some(error) = response.get("error") {
            return Err(anyhow!("OpenAI API error: {}", error));
        }

        let message = openai_response_to_message(&response)?;
        let stop_reason = openai_finish_to_stop_reason(&response);
        let usage = Self::get_usage(&response);

        Ok(Completion::new(message, stop_reason, usage))
    }
}
