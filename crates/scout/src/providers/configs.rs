use serde::Deserialize;

/// Unified enum to wrap different provider configurations
#[derive(Debug, Clone, Deserialize)]
pub enum ProviderConfig {
    Anthropic(AnthropicProviderConfig),
    OpenAi(OpenAiProviderConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicProviderConfig {
    pub host: String,
    pub api_key: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}
