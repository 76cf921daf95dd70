//! Error types for dirhound

use thiserror::Error;

/// Main error type for dirhound operations
#[derive(Debug, Error)]
pub enum DirhoundError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid regular expression: {0}")]
    RegexError(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Session establishment or liveness probe failed for a target
    #[error("{0}")]
    Connectivity(String),

    #[error("Session error: {0}")]
    SessionError(String),

    /// Report or log location cannot be used
    #[error("{0}")]
    Filesystem(String),

    #[error("Standard input closed")]
    InputClosed,
}

/// Result type alias for dirhound operations
pub type Result<T> = std::result::Result<T, DirhoundError>;
