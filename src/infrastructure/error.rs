use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP error! status: {status}")]
    HttpStatus { status: u16 },
    #[error("invalid JSON payload: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("scheduling error: {0}")]
    Scheduling(String),
    #[error("failed to open {url}: {reason}")]
    OpenUrl { url: String, reason: String },
    #[error("OAuth error: {0}")]
    OAuth(String),
    #[error("credential store error: {0}")]
    Credential(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid calendar event: {0}")]
    InvalidEvent(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
