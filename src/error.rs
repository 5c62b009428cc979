//! Shell pipeline error types

/// Errors raised inside the shell pipeline.
///
/// None of these reach the host page: the public entry points log them and
/// degrade to "no shell".
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("shell API returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {0}")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("Malformed shell document: {0}")]
    Malformed(String),
}
