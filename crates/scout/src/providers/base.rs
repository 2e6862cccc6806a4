use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::tool::Tool;

/// Why the model ended its response. Anything other than `ToolUse` is a
/// terminal response for the research loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// A decoded model response: the segments, the termination signal, and
/// whatever usage accounting the backend reported
#[derive(Debug, Clone)]
pub struct Completion {
    pub message: Message,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl Completion {
    pub fn new(message: Message, stop_reason: StopReason, usage: Usage) -> Self {
        Self {
            message,
            stop_reason,
            usage,
        }
    }
}

/// Base trait for AI backends (Anthropic, OpenAI, ...).
///
/// The `model` parameter is chosen per call: each pipeline role can run on
/// an independently selected backend model. The adapter performs wire
/// translation only; no business logic.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<Completion>;
}
