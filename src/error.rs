use thiserror::Error;

/// Main error type for the release tracker
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Credential exchange with the upstream failed
    #[error("Upstream authentication failed: {0}")]
    UpstreamAuth(String),

    /// Transient upstream failure (network, non-2xx, malformed body)
    #[error("Upstream request failed: {0}")]
    UpstreamRequest(String),

    /// Malformed query parameters
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Cache store cannot be reached
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client construction errors
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl TrackerError {
    /// True for failures that originate at the upstream catalog
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            TrackerError::UpstreamAuth(_) | TrackerError::UpstreamRequest(_)
        )
    }

    /// True when the cache store itself is unreachable
    pub fn is_cache_unavailable(&self) -> bool {
        matches!(
            self,
            TrackerError::CacheUnavailable(_) | TrackerError::Database(_)
        )
    }
}

impl From<String> for TrackerError {
    fn from(s: String) -> Self {
        TrackerError::Other(s)
    }
}

impl From<&str> for TrackerError {
    fn from(s: &str) -> Self {
        TrackerError::Other(s.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, TrackerError>;
