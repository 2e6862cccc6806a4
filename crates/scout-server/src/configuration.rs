use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use scout::providers::{
    anthropic::ANTHROPIC_HOST,
    configs::{AnthropicProviderConfig, OpenAiProviderConfig, ProviderConfig},
    openai::OPENAI_HOST,
};
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| {
                ConfigError::Other(config::ConfigError::Message(format!(
                    "invalid server address {}:{} ({})",
                    self.host, self.port, e
                )))
            })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    Anthropic {
        #[serde(default = "default_anthropic_host")]
        host: String,
        api_key: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    // Convert to the scout ProviderConfig
    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::Anthropic {
                host,
                api_key,
                temperature,
                max_tokens,
            } => ProviderConfig::Anthropic(AnthropicProviderConfig {
                host,
                api_key,
                temperature,
                max_tokens,
            }),
            ProviderSettings::OpenAi {
                host,
                api_key,
                temperature,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                temperature,
                max_tokens,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("SCOUT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(ConfigError::Other)?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Point at the exact env var when a required field is absent
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else if let config::ConfigError::NotFound(field) = &err {
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_anthropic_host() -> String {
    ANTHROPIC_HOST.to_string()
}

fn default_openai_host() -> String {
    OPENAI_HOST.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("SCOUT_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();

        env::set_var("SCOUT_PROVIDER__TYPE", "anthropic");
        env::set_var("SCOUT_PROVIDER__API_KEY", "test-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 3000);

        if let ProviderSettings::Anthropic {
            host,
            api_key,
            temperature,
            max_tokens,
        } = settings.provider
        {
            assert_eq!(host, ANTHROPIC_HOST);
            assert_eq!(api_key, "test-key");
            assert_eq!(temperature, None);
            assert_eq!(max_tokens, None);
        } else {
            panic!("Expected Anthropic provider");
        }

        env::remove_var("SCOUT_PROVIDER__TYPE");
        env::remove_var("SCOUT_PROVIDER__API_KEY");
    }

    #[test]
    #[serial]
    fn test_missing_api_key_points_at_env_var() {
        clean_env();

        env::set_var("SCOUT_PROVIDER__TYPE", "anthropic");

        let err = Settings::new().unwrap_err();
        match err {
            ConfigError::MissingEnvVar { env_var } => {
                assert_eq!(env_var, "SCOUT_PROVIDER__API_KEY");
            }
            other => panic!("expected MissingEnvVar, got {:?}", other),
        }

        env::remove_var("SCOUT_PROVIDER__TYPE");
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();

        env::set_var("SCOUT_SERVER__PORT", "8080");
        env::set_var("SCOUT_PROVIDER__TYPE", "openai");
        env::set_var("SCOUT_PROVIDER__API_KEY", "test-key");
        env::set_var("SCOUT_PROVIDER__HOST", "https://custom.openai.com");
        env::set_var("SCOUT_PROVIDER__TEMPERATURE", "0.8");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 8080);

        if let ProviderSettings::OpenAi {
            host,
            api_key,
            temperature,
            ..
        } = settings.provider
        {
            assert_eq!(host, "https://custom.openai.com");
            assert_eq!(api_key, "test-key");
            assert_eq!(temperature, Some(0.8));
        } else {
            panic!("Expected OpenAI provider");
        }

        env::remove_var("SCOUT_SERVER__PORT");
        env::remove_var("SCOUT_PROVIDER__TYPE");
        env::remove_var("SCOUT_PROVIDER__API_KEY");
        env::remove_var("SCOUT_PROVIDER__HOST");
        env::remove_var("SCOUT_PROVIDER__TEMPERATURE");
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let addr = server_settings.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }
}
