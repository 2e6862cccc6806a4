use async_trait::async_trait;

use crate::models::tool::{Tool, ToolCall};

/// The textual outcome of one tool dispatch.
///
/// `count` is the number of discrete results behind the text (e.g. search
/// candidates), surfaced in progress events; it has no effect on what the
/// model sees.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub content: String,
    pub count: Option<usize>,
}

impl ToolOutcome {
    pub fn text<S: Into<String>>(content: S) -> Self {
        Self {
            content: content.into(),
            count: None,
        }
    }

    pub fn counted<S: Into<String>>(content: S, count: usize) -> Self {
        Self {
            content: content.into(),
            count: Some(count),
        }
    }
}

/// A set of read-only tools the researcher role can call.
///
/// `dispatch` never fails: unreachable sources, missing entries and unknown
/// tool names all come back as descriptive text, so the research loop can
/// always pair every request with a result.
#[async_trait]
pub trait Toolkit: Send + Sync {
    /// The tool schema advertised to the model
    fn tools(&self) -> &[Tool];

    /// Execute one tool call and return its textual outcome
    async fn dispatch(&self, call: ToolCall) -> ToolOutcome;
}
