use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Render a settings path as the environment variable that sets it. Every
/// required field lives under [provider], so a bare field name from a
/// missing-field error refers to one of those.
pub fn to_env_var(field: &str) -> String {
    let path = if field.contains('.') {
        field.replace('.', "__")
    } else {
        format!("PROVIDER__{}", field)
    };
    format!("SCOUT_{}", path.to_uppercase())
}
