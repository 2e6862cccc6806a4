//! The phase sequencer: Planning → Research → Synthesis, in fixed order,
//! streaming lifecycle events at every transition.

use std::collections::HashMap;

use crate::events::{AgentEvent, ChannelClosed, DelegateTarget, EventSink};
use crate::models::message::Message;
use crate::plan::Plan;
use crate::prompt_template::load_prompt_file;
use crate::providers::base::Provider;
use crate::researcher::run_research;
use crate::toolkit::Toolkit;

/// One backend model per role, chosen by the caller per request
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSelection {
    pub supervisor: String,
    pub researcher: String,
    pub synthesizer: String,
}

/// Why a run stopped before completing its phases
#[derive(Debug)]
pub enum RunError {
    /// The consumer disconnected; stop silently, nothing can be delivered
    Cancelled,
    /// A phase failed; surfaced as a single error event
    Failed(anyhow::Error),
}

impl From<ChannelClosed> for RunError {
    fn from(_: ChannelClosed) -> Self {
        RunError::Cancelled
    }
}

impl From<anyhow::Error> for RunError {
    fn from(e: anyhow::Error) -> Self {
        RunError::Failed(e)
    }
}

/// One pipeline run per request. Owns no state across runs: the plan, the
/// research transcript and the findings all live and die inside `run`.
pub struct Pipeline {
    provider: Box<dyn Provider>,
    toolkit: Box<dyn Toolkit>,
    models: ModelSelection,
}

impl Pipeline {
    pub fn new(
        provider: Box<dyn Provider>,
        toolkit: Box<dyn Toolkit>,
        models: ModelSelection,
    ) -> Self {
        Self {
            provider,
            toolkit,
            models,
        }
    }

    /// Drive the full pipeline, emitting events into `sink`. Terminal either
    /// on success (after pipeline-done) or on the first unrecovered error
    /// (after a single error event). Never panics the surrounding task.
    pub async fn run(&self, question: &str, sink: &EventSink) {
        match self.run_phases(question, sink).await {
            Ok(()) => {}
            Err(RunError::Cancelled) => {
                tracing::debug!("pipeline run abandoned: consumer disconnected");
            }
            Err(RunError::Failed(e)) => {
                tracing::error!(error = %e, "pipeline run failed");
                let _ = sink
                    .emit(AgentEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        }
    }

    async fn run_phases(&self, question: &str, sink: &EventSink) -> Result<(), RunError> {
        sink.emit(AgentEvent::PlanningStart {
            message: "Breaking the question down into a research plan".to_string(),
        })
        .await?;

        let plan = self.plan(question).await?;
        sink.emit(AgentEvent::PlanProduced {
            search_term: plan.search_term.clone(),
            response_format: plan.response_format.clone(),
        })
        .await?;

        let research_instruction = render(
            "research_task.md",
            &[("search_term", plan.search_term.as_str())],
        )?;
        sink.emit(AgentEvent::Delegate {
            to: DelegateTarget::Researcher,
            instructions: research_instruction.clone(),
        })
        .await?;

        let findings = run_research(
            self.provider.as_ref(),
            &self.models.researcher,
            self.toolkit.as_ref(),
            &research_instruction,
            sink,
        )
        .await?;

        let synthesis_instruction = render(
            "synthesis_task.md",
            &[
                ("question", question),
                ("response_format", plan.response_format.as_str()),
                ("findings", findings.as_str()),
            ],
        )?;
        sink.emit(AgentEvent::Delegate {
            to: DelegateTarget::Synthesizer,
            instructions: synthesis_instruction.clone(),
        })
        .await?;
        sink.emit(AgentEvent::SynthesisStart).await?;

        let answer = self.synthesize(&synthesis_instruction).await?;
        sink.emit(AgentEvent::SynthesisDone { answer }).await?;
        sink.emit(AgentEvent::PipelineDone).await?;
        Ok(())
    }

    /// Ask the supervisor model for a plan; substitute the fallback plan if
    /// its reply is not usable. The pipeline never fails solely because the
    /// planner's free-form output was not strict JSON.
    async fn plan(&self, question: &str) -> Result<Plan, RunError> {
        let system = render("planner.md", &[])?;
        let messages = vec![Message::user().with_text(question)];
        let completion = self
            .provider
            .complete(&self.models.supervisor, &system, &messages, &[])
            .await?;

        let reply = completion.message.first_text().unwrap_or_default();
        Ok(Plan::parse(reply).unwrap_or_else(|| Plan::fallback(question)))
    }

    async fn synthesize(&self, instruction: &str) -> Result<String, RunError> {
        let system = render("synthesizer.md", &[])?;
        let messages = vec![Message::user().with_text(instruction)];
        let completion = self
            .provider
            .complete(&self.models.synthesizer, &system, &messages, &[])
            .await?;

        Ok(completion
            .message
            .first_text()
            .unwrap_or_default()
            .to_string())
    }
}

fn render(template: &str, vars: &[(&str, &str)]) -> Result<String, RunError> {
    let context: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    load_prompt_file(template, &context).map_err(|e| RunError::Failed(e.into()))
}
