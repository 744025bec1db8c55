use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Invalid {provider} credentials: {}", .fields.join(", "))]
    Validation {
        provider: String,
        fields: Vec<String>,
    },

    #[error("Unknown provider type: {0}")]
    UnknownProvider(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Authentication failed (HTTP {status_code}): {message}")]
    Authentication { message: String, status_code: u16 },

    #[error("Rate limit exceeded{}", .retry_after.map(|s| format!(". Retry after {} seconds", s)).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    #[error("API error{}: {message}", status_code.map(|c| format!(" (HTTP {})", c)).unwrap_or_default())]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No provider named {0} in configuration")]
    InvalidProvider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl LlmError {
    /// True for errors raised before any network traffic.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::UnknownProvider(_))
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
