//! Error types for the HTTP transport

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status: {0}")]
    HttpStatus(StatusCode),

    #[error("Invalid URI '{uri}': {message}")]
    InvalidUri { uri: String, message: String },

    #[error("Server ignored the resume range")]
    RangeNotSatisfiable,

    #[error("No tokio runtime: {0}")]
    NoRuntime(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TransportError {
    /// Whether retrying the same download might succeed
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Network(_) | Self::RangeNotSatisfiable => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            Self::HttpStatus(status) => matches!(
                *status,
                StatusCode::TOO_MANY_REQUESTS
                    | StatusCode::INTERNAL_SERVER_ERROR
                    | StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT
            ),
            Self::InvalidUri { .. } | Self::NoRuntime(_) | Self::Config(_) => false,
        }
    }
}

impl From<TransportError> for strata_client_storage::StorageError {
    fn from(error: TransportError) -> Self {
        Self::Transport(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
