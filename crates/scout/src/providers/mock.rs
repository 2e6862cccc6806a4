use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{Completion, Provider, StopReason, Usage};

/// Build a completion with empty usage, for scripting mock replies
pub fn completion(message: Message, stop_reason: StopReason) -> Completion {
    Completion::new(message, stop_reason, Usage::default())
}

/// One scripted reply: either a completion or a transport failure
pub enum MockReply {
    Completion(Completion),
    Failure(String),
}

/// A mock provider that returns pre-configured responses for testing
pub struct MockProvider {
    replies: Arc<Mutex<Vec<MockReply>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of completions
    pub fn new(completions: Vec<Completion>) -> Self {
        Self::from_replies(completions.into_iter().map(MockReply::Completion).collect())
    }

    /// Create a mock provider with explicit replies, including failures
    pub fn from_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies)),
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        _model: &str,
        _system: &str,
        _messages: &[Message],
        _tools: &[Tool],
    ) -> Result<Completion> {
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            // Return empty response if no more pre-configured replies
            return Ok(completion(
                Message::assistant().with_text(""),
                StopReason::EndTurn,
            ));
        }
        match replies.remove(0) {
            MockReply::Completion(reply) => Ok(reply),
            MockReply::Failure(reason) => Err(anyhow!(reason)),
        }
    }
}
