use anyhow::Result;
use strum_macros::{Display, EnumIter};

use super::{
    anthropic::AnthropicProvider, base::Provider, configs::ProviderConfig, openai::OpenAiProvider,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ProviderType {
    Anthropic,
    OpenAi,
}

pub fn get_provider(config: ProviderConfig) -> Result<Box<dyn Provider + Send + Sync>> {
    match config {
        ProviderConfig::Anthropic(anthropic_config) => {
            Ok(Box::new(AnthropicProvider::new(anthropic_config)?))
        }
        ProviderConfig::OpenAi(openai_config) => Ok(Box::new(OpenAiProvider::new(openai_config)?)),
    }
}
