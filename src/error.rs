use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Unknown measurement method: {0}")]
    UnknownMethod(String),

    #[error("Invalid country code '{0}': expected two letters")]
    InvalidCountryCode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{provider} API request failed with status {status}")]
    ProviderApi { provider: String, status: u16 },

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("{0}")]
    Custom(String),
}

pub type Result<T> = std::result::Result<T, ProbeError>;
