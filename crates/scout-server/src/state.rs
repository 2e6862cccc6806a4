use scout::providers::configs::ProviderConfig;

/// Shared application state: one provider configuration, cloned per request
#[derive(Clone)]
pub struct AppState {
    pub provider_config: ProviderConfig,
}

impl AppState {
    pub fn new(provider_config: ProviderConfig) -> Self {
        Self { provider_config }
    }
}
