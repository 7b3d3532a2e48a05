//! Error types for platform API calls.
//!
//! Errors are categorized from the HTTP status so callers can decide whether a
//! failed call is worth repeating.

use std::fmt;

/// Result type alias for API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of API errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Throttling, server errors and transport failures (transient, retryable).
    Network,
    /// The addressed resource does not exist.
    NotFound,
    /// The resource already exists or is still referenced.
    Conflict,
    /// Credentials rejected or lacking a role binding.
    Permission,
    /// The request was rejected as malformed.
    Invalid,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Classify an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 | 500..=599 => Self::Network,
            404 => Self::NotFound,
            409 => Self::Conflict,
            401 | 403 => Self::Permission,
            400 | 422 => Self::Invalid,
            _ => Self::Other,
        }
    }

    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Transient API or network failure",
            Self::NotFound => "Resource not found",
            Self::Conflict => "Resource conflict",
            Self::Permission => "Permission denied",
            Self::Invalid => "Request rejected",
            Self::Other => "Unexpected error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur talking to the platform.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// Response body did not have the expected shape.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// A lookup returned nothing.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up.
        kind: &'static str,
        /// Identifier or scope used for the lookup.
        id: String,
    },
}

impl Error {
    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Http {
            message: message.into(),
            status,
        }
    }

    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Http {
                status: Some(code), ..
            } => ErrorCategory::from_status(*code),
            // No status: the request never completed
            Error::Http { status: None, .. } => ErrorCategory::Network,
            Error::InvalidResponse(_) => ErrorCategory::Other,
            Error::NotFound { .. } => ErrorCategory::NotFound,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            ureq::Error::Json(e) => Self::InvalidResponse(e.to_string()),
            other => Self::Http {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
