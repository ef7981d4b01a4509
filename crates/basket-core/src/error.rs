use thiserror::Error;

/// Application-wide error types for Basket.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request could not be built.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The target answered with a non-success, non-5xx status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// The target answered with a 5xx status.
    #[error("Server error (HTTP {status}) for {url}")]
    ServerError { status: u16, url: String },

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A single attempt exceeded its timeout.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// The attempt was cancelled before it completed.
    #[error("Request cancelled")]
    Cancelled,

    /// Every attempt of a logical request failed.
    #[error("Retries exhausted after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<AppError>,
    },

    /// A scraper with this id is already registered.
    #[error("Scraper '{0}' is already registered")]
    DuplicateScraper(String),

    /// No scraper is registered under this id.
    #[error("Scraper '{0}' not found")]
    ScraperNotFound(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::ServerError { .. } => {
                true
            }
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }

    /// The error of the last attempt, unwrapping `RetryExhausted`.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::RetryExhausted { source, .. } => source.root(),
            other => other,
        }
    }
}
