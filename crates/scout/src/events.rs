//! The progress events a pipeline run streams to its consumer.
//!
//! Events are immutable once constructed and emitted exactly once, in the
//! order produced. The consumer sees one serialized event per frame; the
//! channel closes after either `pipeline-done` or `error`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelegateTarget {
    Researcher,
    Synthesizer,
}

/// One observable unit of pipeline progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentEvent {
    PlanningStart {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    PlanProduced {
        search_term: String,
        response_format: String,
    },
    Delegate {
        to: DelegateTarget,
        instructions: String,
    },
    ResearchStart,
    ResearchThinking {
        text: String,
    },
    ResearchToolCall {
        tool: String,
        input: Value,
    },
    ResearchToolResult {
        preview: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        count: Option<usize>,
    },
    ResearchDone,
    SynthesisStart,
    SynthesisDone {
        answer: String,
    },
    PipelineDone,
    Error {
        message: String,
    },
}

/// The consumer went away; no further events can be delivered.
#[derive(Debug, Error)]
#[error("event channel closed by consumer")]
pub struct ChannelClosed;

/// Ordered, append-only emitter for one pipeline run.
///
/// A failed send means the receiving end was dropped (client disconnect);
/// callers must stop producing once that is observed.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<AgentEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<AgentEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving half of its channel
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<AgentEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    pub async fn emit(&self, event: AgentEvent) -> Result<(), ChannelClosed> {
        self.tx.send(event).await.map_err(|_| ChannelClosed)
    }
}
