use chrono::Utc;

use super::role::Role;
use super::tool::ToolCall;
use crate::errors::AgentResult;

/// A tool invocation requested by the model. The id must be echoed back
/// unchanged on the paired response so the provider can match them across
/// a multi-request turn.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub tool_call: AgentResult<ToolCall>,
}

/// The textual outcome of one tool invocation. Failures are carried as
/// descriptive text, never as a hard error.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolResponse {
    pub id: String,
    pub content: String,
}

/// Content passed inside a message, either plain text or tool traffic
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MessageContent {
    Text(String),
    ToolRequest(ToolRequest),
    ToolResponse(ToolResponse),
}

impl MessageContent {
    pub fn text<S: Into<String>>(text: S) -> Self {
        MessageContent::Text(text.into())
    }

    pub fn tool_request<S: Into<String>>(id: S, tool_call: AgentResult<ToolCall>) -> Self {
        MessageContent::ToolRequest(ToolRequest {
            id: id.into(),
            tool_call,
        })
    }

    pub fn tool_response<S: Into<String>, C: Into<String>>(id: S, content: C) -> Self {
        MessageContent::ToolResponse(ToolResponse {
            id: id.into(),
            content: content.into(),
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_tool_request(&self) -> Option<&ToolRequest> {
        if let MessageContent::ToolRequest(ref tool_request) = self {
            Some(tool_request)
        } else {
            None
        }
    }

    pub fn as_tool_response(&self) -> Option<&ToolResponse> {
        if let MessageContent::ToolResponse(ref tool_response) = self {
            Some(tool_response)
        } else {
            None
        }
    }
}

/// A message to or from an LLM
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub role: Role,
    pub created: i64,
    pub content: Vec<MessageContent>,
}

impl Message {
    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Message {
            role: Role::User,
            created: Utc::now().timestamp(),
            content: Vec::new(),
        }
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Message {
            role: Role::Assistant,
            created: Utc::now().timestamp(),
            content: Vec::new(),
        }
    }

    pub fn with_content(mut self, content: MessageContent) -> Self {
        self.content.push(content);
        self
    }

    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_content(MessageContent::text(text))
    }

    pub fn with_tool_request<S: Into<String>>(
        self,
        id: S,
        tool_call: AgentResult<ToolCall>,
    ) -> Self {
        self.with_content(MessageContent::tool_request(id, tool_call))
    }

    pub fn with_tool_response<S: Into<String>, C: Into<String>>(self, id: S, content: C) -> Self {
        self.with_content(MessageContent::tool_response(id, content))
    }

    /// All text segments, in the order the model emitted them
    pub fn text_segments(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|c| c.as_text())
    }

    /// The first text segment, if any
    pub fn first_text(&self) -> Option<&str> {
        self.text_segments().next()
    }

    /// All tool requests in this message, in emission order
    pub fn tool_requests(&self) -> Vec<&ToolRequest> {
        self.content
            .iter()
            .filter_map(|c| c.as_tool_request())
            .collect()
    }
}
