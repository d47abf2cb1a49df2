use thiserror::Error;

/// Unified error type for the booker
#[derive(Error, Debug)]
pub enum BookerError {
    // Proxy errors
    #[error("No proxies available")]
    NoProxiesAvailable,

    #[error("Proxy probe failed: {0}")]
    ProbeFailed(String),

    #[error("Feed {url} unavailable: {reason}")]
    FeedUnavailable { url: String, reason: String },

    // Cache errors
    #[error("Proxy cache error: {0}")]
    Cache(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not configured: {0}")]
    NotConfigured(&'static str),

    // Candidate data
    #[error("Invalid candidate data: {0}")]
    CandidateData(String),

    #[error("Operation timed out")]
    Timeout,

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Result type alias for booker operations
pub type Result<T> = std::result::Result<T, BookerError>;

/// Recovery bucket an error falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Aborts the current attempt only; the loop carries on.
    TransientStep,
    /// No endpoint to work with; backed off and retried inside the loop.
    ResourceExhaustion,
    /// Fails fast before the loop starts.
    Configuration,
    Internal,
}

impl BookerError {
    /// Map this error onto its recovery bucket
    pub fn class(&self) -> FailureClass {
        match self {
            BookerError::ProbeFailed(_)
            | BookerError::FeedUnavailable { .. }
            | BookerError::Timeout
            | BookerError::Http(_) => FailureClass::TransientStep,

            BookerError::NoProxiesAvailable => FailureClass::ResourceExhaustion,

            BookerError::InvalidConfig(_)
            | BookerError::NotConfigured(_)
            | BookerError::CandidateData(_) => FailureClass::Configuration,

            BookerError::Cache(_)
            | BookerError::Io(_)
            | BookerError::Json(_) => FailureClass::Internal,
        }
    }

    /// Check if this error only costs the current attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self.class(),
            FailureClass::TransientStep | FailureClass::ResourceExhaustion
        )
    }
}

impl From<reqwest::Error> for BookerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BookerError::Timeout
        } else {
            BookerError::Http(err.to_string())
        }
    }
}

impl From<url::ParseError> for BookerError {
    fn from(err: url::ParseError) -> Self {
        BookerError::InvalidConfig(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_class_mapping() {
        assert_eq!(
            BookerError::ProbeFailed("reset".to_string()).class(),
            FailureClass::TransientStep
        );
        assert_eq!(BookerError::Timeout.class(), FailureClass::TransientStep);
        assert_eq!(
            BookerError::FeedUnavailable {
                url: "http://feed.example".to_string(),
                reason: "HTTP 503".to_string()
            }
            .class(),
            FailureClass::TransientStep
        );
        assert_eq!(
            BookerError::NoProxiesAvailable.class(),
            FailureClass::ResourceExhaustion
        );
        assert_eq!(
            BookerError::NotConfigured("target").class(),
            FailureClass::Configuration
        );
        assert_eq!(
            BookerError::Cache("disk full".to_string()).class(),
            FailureClass::Internal
        );
    }

    #[test]
    fn test_error_transient_helper() {
        assert!(BookerError::NoProxiesAvailable.is_transient());
        assert!(BookerError::Http("502".to_string()).is_transient());
        assert!(!BookerError::InvalidConfig("bad".to_string()).is_transient());
        assert!(!BookerError::Cache("boom".to_string()).is_transient());
    }

    #[test]
    fn test_url_parse_error_is_config_error() {
        let err: BookerError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, BookerError::InvalidConfig(_)));
    }
}
