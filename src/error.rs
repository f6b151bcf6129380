//! Error types for callguard.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CallguardError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Framing errors
    #[error("No identity sentinel within the first {limit} bytes of the stream")]
    MissingIdentity { limit: usize },

    #[error("Identity header is not valid UTF-8")]
    HeaderNotUtf8,

    // Analysis errors
    #[error("Analysis request failed: {message}")]
    Analysis { message: String },

    #[error("Malformed analysis response: {message}")]
    AnalysisResponse { message: String },

    // Notification errors
    #[error("Push publish failed: {message}")]
    Publish { message: String },

    // Listener errors
    #[error("Failed to bind {addr}: {message}")]
    Bind { addr: String, message: String },

    #[error("Failed to accept connection: {message}")]
    Accept { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, CallguardError>;
