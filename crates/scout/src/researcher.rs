//! The autonomous research loop: repeated model/tool exchanges for the
//! researcher role until the model stops asking for tools.

use std::collections::HashMap;

use serde_json::json;

use crate::events::{AgentEvent, EventSink};
use crate::models::message::{Message, ToolRequest};
use crate::pipeline::RunError;
use crate::prompt_template::load_prompt_file;
use crate::providers::base::{Provider, StopReason};
use crate::toolkit::{Toolkit, ToolOutcome};

/// Hard cap on tool rounds. A model that keeps requesting tools past this
/// is cut off and synthesis runs on whatever was gathered.
pub const MAX_TOOL_TURNS: usize = 24;

/// Display cap for tool-result previews in progress events. The full text
/// still enters the conversation history.
const RESULT_PREVIEW_CAP: usize = 280;

fn preview(text: &str) -> String {
    if text.chars().count() <= RESULT_PREVIEW_CAP {
        return text.to_string();
    }
    let cut: String = text.chars().take(RESULT_PREVIEW_CAP).collect();
    format!("{}…", cut.trim_end())
}

/// Drive the researcher until it returns a terminal response, streaming
/// progress into `sink` as it happens. Returns the findings summary, which
/// may be empty if the terminal response carried no text.
pub async fn run_research(
    provider: &dyn Provider,
    model: &str,
    toolkit: &dyn Toolkit,
    instruction: &str,
    sink: &EventSink,
) -> Result<String, RunError> {
    sink.emit(AgentEvent::ResearchStart).await?;

    let system = load_prompt_file("researcher.md", &HashMap::<String, String>::new())
        .map_err(anyhow::Error::from)?;

    let mut messages = vec![Message::user().with_text(instruction)];
    let mut thinking: Vec<String> = Vec::new();

    for _ in 0..MAX_TOOL_TURNS {
        let completion = provider
            .complete(model, &system, &messages, toolkit.tools())
            .await?;

        // surface text as soon as the model produced it, before any tool
        // result returns
        for text in completion.message.text_segments() {
            sink.emit(AgentEvent::ResearchThinking {
                text: text.to_string(),
            })
            .await?;
            thinking.push(text.to_string());
        }

        let requests: Vec<ToolRequest> = completion
            .message
            .tool_requests()
            .into_iter()
            .cloned()
            .collect();

        if completion.stop_reason != StopReason::ToolUse || requests.is_empty() {
            let findings = completion
                .message
                .first_text()
                .unwrap_or_default()
                .to_string();
            sink.emit(AgentEvent::ResearchDone).await?;
            return Ok(findings);
        }

        let mut results = Message::user();
        for request in &requests {
            let outcome = match &request.tool_call {
                Ok(call) => {
                    sink.emit(AgentEvent::ResearchToolCall {
                        tool: call.name.clone(),
                        input: call.arguments.clone(),
                    })
                    .await?;
                    toolkit.dispatch(call.clone()).await
                }
                Err(e) => {
                    sink.emit(AgentEvent::ResearchToolCall {
                        tool: "unknown".to_string(),
                        input: json!({}),
                    })
                    .await?;
                    ToolOutcome::text(format!("Invalid tool request: {}", e))
                }
            };

            sink.emit(AgentEvent::ResearchToolResult {
                preview: preview(&outcome.content),
                count: outcome.count,
            })
            .await?;

            results = results.with_tool_response(request.id.clone(), outcome.content);
        }

        // one assistant turn echoing the raw segments, then one user turn
        // carrying every result of this round batched together
        messages.push(completion.message);
        messages.push(results);
    }

    // tool budget exhausted: report what was gathered instead of failing
    let mut findings = thinking.join("\n\n");
    if !findings.is_empty() {
        findings.push_str("\n\n");
    }
    findings.push_str("[research truncated: tool budget exhausted]");
    sink.emit(AgentEvent::ResearchDone).await?;
    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AgentError;
    use crate::models::tool::{Tool, ToolCall};
    use crate::providers::base::{Completion, Usage};
    use crate::providers::mock::{completion, MockProvider};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every dispatched call and echoes the query back
    struct EchoToolkit {
        tools: Vec<Tool>,
        calls: Mutex<Vec<ToolCall>>,
    }

    impl EchoToolkit {
        fn new() -> Self {
            Self {
                tools: vec![Tool::new(
                    "search",
                    "Search the encyclopedia",
                    json!({"type": "object", "properties": {"query": {"type": "string"}}}),
                )],
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Toolkit for EchoToolkit {
        fn tools(&self) -> &[Tool] {
            &self.tools
        }

        async fn dispatch(&self, call: ToolCall) -> ToolOutcome {
            self.calls.lock().unwrap().push(call.clone());
            match call.name.as_str() {
                "search" => ToolOutcome::counted(
                    format!(
                        "1. {} — an article",
                        call.arguments["query"].as_str().unwrap_or("")
                    ),
                    1,
                ),
                other => ToolOutcome::text(format!("Unknown tool: {}", other)),
            }
        }
    }

    /// Scripted provider that also records the messages of every call
    struct RecordingProvider {
        replies: Mutex<Vec<Completion>>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl RecordingProvider {
        fn new(replies: Vec<Completion>) -> Self {
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Provider for RecordingProvider {
        async fn complete(
            &self,
            _model: &str,
            _system: &str,
            messages: &[Message],
            _tools: &[Tool],
        ) -> Result<Completion> {
            self.seen.lock().unwrap().push(messages.to_vec());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Ok(completion(
                    Message::assistant().with_text(""),
                    StopReason::EndTurn,
                ));
            }
            Ok(replies.remove(0))
        }
    }

    async fn collect_events(
        rx: &mut tokio::sync::mpsc::Receiver<AgentEvent>,
    ) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_terminal_response_returns_findings() {
        let provider = MockProvider::new(vec![completion(
            Message::assistant().with_text("X is a thing."),
            StopReason::EndTurn,
        )]);
        let toolkit = EchoToolkit::new();
        let (sink, mut rx) = EventSink::channel(32);

        let findings = run_research(&provider, "test-model", &toolkit, "Research X", &sink)
            .await
            .unwrap();

        assert_eq!(findings, "X is a thing.");
        let events = collect_events(&mut rx).await;
        assert_eq!(
            events,
            vec![
                AgentEvent::ResearchStart,
                AgentEvent::ResearchThinking {
                    text: "X is a thing.".to_string()
                },
                AgentEvent::ResearchDone,
            ]
        );
    }

    #[tokio::test]
    async fn test_tool_round_batches_paired_results() {
        let provider = RecordingProvider::new(vec![
            completion(
                Message::assistant()
                    .with_text("Searching")
                    .with_tool_request("1", Ok(ToolCall::new("search", json!({"query": "X"}))))
                    .with_tool_request("2", Ok(ToolCall::new("search", json!({"query": "Y"})))),
                StopReason::ToolUse,
            ),
            completion(
                Message::assistant().with_text("X and Y are related."),
                StopReason::EndTurn,
            ),
        ]);
        let toolkit = EchoToolkit::new();
        let (sink, mut rx) = EventSink::channel(32);

        let findings = run_research(&provider, "test-model", &toolkit, "Research X", &sink)
            .await
            .unwrap();
        assert_eq!(findings, "X and Y are related.");

        // the second provider call saw one assistant echo and one batched
        // user turn with exactly one result per request, matched by id
        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let second_call = &seen[1];
        assert_eq!(second_call.len(), 3);
        let batched = &second_call[2];
        let responses: Vec<_> = batched
            .content
            .iter()
            .filter_map(|c| c.as_tool_response())
            .collect();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].id, "1");
        assert_eq!(responses[1].id, "2");
        assert_eq!(responses[0].content, "1. X — an article");

        let events = collect_events(&mut rx).await;
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                AgentEvent::ResearchStart => "start",
                AgentEvent::ResearchThinking { .. } => "thinking",
                AgentEvent::ResearchToolCall { .. } => "call",
                AgentEvent::ResearchToolResult { .. } => "result",
                AgentEvent::ResearchDone => "done",
                _ => "other",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["start", "thinking", "call", "result", "call", "result", "thinking", "done"]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_still_pairs_a_result() {
        let provider = RecordingProvider::new(vec![
            completion(
                Message::assistant()
                    .with_tool_request("1", Ok(ToolCall::new("delete_article", json!({})))),
                StopReason::ToolUse,
            ),
            completion(
                Message::assistant().with_text("Could not use that tool."),
                StopReason::EndTurn,
            ),
        ]);
        let toolkit = EchoToolkit::new();
        let (sink, _rx) = EventSink::channel(32);

        let findings = run_research(&provider, "test-model", &toolkit, "Research X", &sink)
            .await
            .unwrap();
        assert_eq!(findings, "Could not use that tool.");

        let seen = provider.seen.lock().unwrap();
        let batched = &seen[1][2];
        let responses: Vec<_> = batched
            .content
            .iter()
            .filter_map(|c| c.as_tool_response())
            .collect();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id, "1");
        assert_eq!(responses[0].content, "Unknown tool: delete_article");
    }

    #[tokio::test]
    async fn test_invalid_tool_request_still_pairs_a_result() {
        let provider = RecordingProvider::new(vec![
            completion(
                Message::assistant().with_tool_request(
                    "1",
                    Err(AgentError::InvalidParameters("bad arguments".to_string())),
                ),
                StopReason::ToolUse,
            ),
            completion(
                Message::assistant().with_text("Moving on."),
                StopReason::EndTurn,
            ),
        ]);
        let toolkit = EchoToolkit::new();
        let (sink, _rx) = EventSink::channel(32);

        let findings = run_research(&provider, "test-model", &toolkit, "Research X", &sink)
            .await
            .unwrap();
        assert_eq!(findings, "Moving on.");

        // the toolkit was never reached, but a textual result was paired
        assert!(toolkit.calls.lock().unwrap().is_empty());
        let seen = provider.seen.lock().unwrap();
        let batched = &seen[1][2];
        let response = batched.content[0].as_tool_response().unwrap();
        assert_eq!(response.id, "1");
        assert!(response.content.starts_with("Invalid tool request:"));
    }

    #[tokio::test]
    async fn test_tool_budget_cap_truncates_instead_of_failing() {
        struct LoopingProvider;

        #[async_trait]
        impl Provider for LoopingProvider {
            async fn complete(
                &self,
                _model: &str,
                _system: &str,
                _messages: &[Message],
                _tools: &[Tool],
            ) -> Result<Completion> {
                Ok(Completion::new(
                    Message::assistant()
                        .with_text("still digging")
                        .with_tool_request("1", Ok(ToolCall::new("search", json!({"query": "X"})))),
                    StopReason::ToolUse,
                    Usage::default(),
                ))
            }
        }

        let toolkit = EchoToolkit::new();
        let (sink, mut rx) = EventSink::channel(512);

        let findings = run_research(&LoopingProvider, "test-model", &toolkit, "Research X", &sink)
            .await
            .unwrap();

        assert!(findings.ends_with("[research truncated: tool budget exhausted]"));
        assert_eq!(toolkit.calls.lock().unwrap().len(), MAX_TOOL_TURNS);
        let events = collect_events(&mut rx).await;
        assert_eq!(events.last(), Some(&AgentEvent::ResearchDone));
    }

    #[tokio::test]
    async fn test_disconnected_consumer_stops_the_loop() {
        let provider = MockProvider::new(vec![completion(
            Message::assistant().with_text("X is a thing."),
            StopReason::EndTurn,
        )]);
        let toolkit = EchoToolkit::new();
        let (sink, rx) = EventSink::channel(32);
        drop(rx);

        let result = run_research(&provider, "test-model", &toolkit, "Research X", &sink).await;
        assert!(matches!(result, Err(RunError::Cancelled)));
    }

    #[test]
    fn test_preview_truncates_long_results() {
        let long = "x".repeat(RESULT_PREVIEW_CAP + 50);
        let shown = preview(&long);
        assert!(shown.chars().count() <= RESULT_PREVIEW_CAP + 1);
        assert!(shown.ends_with('…'));
        assert_eq!(preview("short"), "short");
    }
}
