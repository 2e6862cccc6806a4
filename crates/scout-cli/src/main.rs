use anyhow::{anyhow, Result};
use clap::Parser;
use console::style;
use std::env;

use scout::events::{AgentEvent, DelegateTarget, EventSink};
use scout::pipeline::{ModelSelection, Pipeline};
use scout::providers::anthropic::ANTHROPIC_HOST;
use scout::providers::configs::{AnthropicProviderConfig, OpenAiProviderConfig, ProviderConfig};
use scout::providers::factory;
use scout::providers::openai::OPENAI_HOST;
use scout::wikipedia::WikipediaToolkit;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The question to research
    question: String,

    /// Provider option (anthropic or openai)
    #[arg(short, long, default_value = "anthropic")]
    #[arg(value_enum)]
    provider: ProviderVariant,

    /// API key (can also be set via ANTHROPIC_API_KEY or OPENAI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Model for every role unless overridden per role
    #[arg(short, long)]
    model: Option<String>,

    /// Model for the planning role
    #[arg(long)]
    supervisor_model: Option<String>,

    /// Model for the research role
    #[arg(long)]
    researcher_model: Option<String>,

    /// Model for the synthesis role
    #[arg(long)]
    synthesizer_model: Option<String>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ProviderVariant {
    Anthropic,
    OpenAi,
}

fn default_model(provider: ProviderVariant) -> &'static str {
    match provider {
        ProviderVariant::Anthropic => "claude-3-5-sonnet-latest",
        ProviderVariant::OpenAi => "gpt-4o",
    }
}

fn provider_config(cli: &Cli) -> Result<ProviderConfig> {
    match cli.provider {
        ProviderVariant::Anthropic => {
            let api_key = cli
                .api_key
                .clone()
                .or_else(|| env::var("ANTHROPIC_API_KEY").ok())
                .ok_or_else(|| anyhow!("pass --api-key or set ANTHROPIC_API_KEY"))?;
            Ok(ProviderConfig::Anthropic(AnthropicProviderConfig {
                host: ANTHROPIC_HOST.to_string(),
                api_key,
                temperature: None,
                max_tokens: None,
            }))
        }
        ProviderVariant::OpenAi => {
            let api_key = cli
                .api_key
                .clone()
                .or_else(|| env::var("OPENAI_API_KEY").ok())
                .ok_or_else(|| anyhow!("pass --api-key or set OPENAI_API_KEY"))?;
            Ok(ProviderConfig::OpenAi(OpenAiProviderConfig {
                host: OPENAI_HOST.to_string(),
                api_key,
                temperature: None,
                max_tokens: None,
            }))
        }
    }
}

fn render_event(event: &AgentEvent) {
    match event {
        AgentEvent::PlanningStart { message } => {
            println!("{}", style(message).dim());
        }
        AgentEvent::PlanProduced {
            search_term,
            response_format,
        } => {
            println!(
                "{} search \"{}\", format \"{}\"",
                style("plan:").cyan().bold(),
                search_term,
                response_format
            );
        }
        AgentEvent::Delegate { to, .. } => {
            let target = match to {
                DelegateTarget::Researcher => "researcher",
                DelegateTarget::Synthesizer => "synthesizer",
            };
            println!("{}", style(format!("handing off to {}", target)).dim());
        }
        AgentEvent::ResearchStart => {
            println!("{}", style("researching...").dim());
        }
        AgentEvent::ResearchThinking { text } => {
            println!("{}", style(text).italic().dim());
        }
        AgentEvent::ResearchToolCall { tool, input } => {
            println!("{} {} {}", style("tool:").cyan(), tool, style(input).dim());
        }
        AgentEvent::ResearchToolResult { preview, count } => {
            match count {
                Some(count) => println!(
                    "{} {} ({} results)",
                    style("result:").cyan(),
                    style(preview).dim(),
                    count
                ),
                None => println!("{} {}", style("result:").cyan(), style(preview).dim()),
            };
        }
        AgentEvent::ResearchDone => {
            println!("{}", style("research complete").dim());
        }
        AgentEvent::SynthesisStart => {
            println!("{}", style("writing the answer...").dim());
        }
        AgentEvent::SynthesisDone { answer } => {
            println!("\n{}\n", answer);
        }
        AgentEvent::PipelineDone => {}
        AgentEvent::Error { message } => {
            eprintln!("{} {}", style("error:").red().bold(), message);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let provider = factory::get_provider(provider_config(&cli)?)?;
    let toolkit = WikipediaToolkit::new()?;

    let base = cli
        .model
        .clone()
        .unwrap_or_else(|| default_model(cli.provider).to_string());
    let models = ModelSelection {
        supervisor: cli.supervisor_model.clone().unwrap_or_else(|| base.clone()),
        researcher: cli.researcher_model.clone().unwrap_or_else(|| base.clone()),
        synthesizer: cli.synthesizer_model.clone().unwrap_or(base),
    };

    let pipeline = Pipeline::new(provider, Box::new(toolkit), models);
    let (sink, mut rx) = EventSink::channel(100);

    let question = cli.question.clone();
    let run = tokio::spawn(async move {
        pipeline.run(&question, &sink).await;
    });

    let mut failure: Option<String> = None;
    while let Some(event) = rx.recv().await {
        if let AgentEvent::Error { message } = &event {
            failure = Some(message.clone());
        }
        render_event(&event);
    }
    run.await?;

    match failure {
        Some(message) => Err(anyhow!(message)),
        None => Ok(()),
    }
}
