//! Error types for the provisioning engine.
//!
//! Errors fall into three groups:
//! - construction errors ([`Error::CycleDetected`], [`Error::UnresolvedDependency`], ...)
//!   abort a run before any resource is touched
//! - execution errors ([`Error::CreateFailed`], [`Error::ResourceNotReady`], ...) are
//!   contained to the failing subtree and reported per resource
//! - contract violations ([`Error::DuplicateOutput`], [`Error::OutputNotFound`]) point at a
//!   bug in descriptor construction and are always fatal

use thiserror::Error;

/// Categories of platform errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Throttling, 5xx, connection resets (transient, retryable)
    Transient,
    /// The addressed resource does not exist
    NotFound,
    /// The resource already exists or conflicts with another one
    Conflict,
    /// Credentials rejected or insufficient
    Permission,
    /// The request itself is malformed
    Invalid,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transient => "Transient platform error",
            Self::NotFound => "Resource not found",
            Self::Conflict => "Resource conflict",
            Self::Permission => "Permission denied",
            Self::Invalid => "Invalid request",
            Self::Other => "Unexpected error",
        }
    }
}

/// An error reported by a [`Platform`](crate::Platform) implementation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PlatformError {
    /// What went wrong, as reported by the backing platform
    pub message: String,
    /// Category used to decide whether the failure is retryable
    pub category: ErrorCategory,
}

impl PlatformError {
    /// Create a platform error with an explicit category.
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category,
        }
    }

    /// A transient failure (throttling, timeouts, 5xx).
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Transient, message)
    }

    /// A missing or malformed request input.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Invalid, message)
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

/// Errors produced by the provisioning engine.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A descriptor transitively depends on itself
    #[error("dependency cycle detected: {}", cycle.join(" -> "))]
    CycleDetected {
        /// The cycle path, first element repeated at the end
        cycle: Vec<String>,
    },

    /// A dependency names a resource that is not in the graph
    #[error("{resource} depends on unknown resource {missing}")]
    UnresolvedDependency {
        /// The declaring resource
        resource: String,
        /// The logical name that could not be found
        missing: String,
    },

    /// Two descriptors share a logical name
    #[error("resource {name} is declared more than once")]
    DuplicateResource {
        /// The duplicated logical name
        name: String,
    },

    /// A link pair references missing or mistyped resources
    #[error("invalid link pair {pair}: {message}")]
    InvalidLinkPair {
        /// Name of the link pair
        pair: String,
        /// What is wrong with it
        message: String,
    },

    /// A poll-after-delay resource did not become queryable within the probe ceiling
    #[error("{resource} not ready after {attempts} probes")]
    ResourceNotReady {
        /// The resource being gated
        resource: String,
        /// Number of probes performed
        attempts: u32,
    },

    /// The platform rejected a create call
    #[error("failed to create {resource}: {source}")]
    CreateFailed {
        /// The resource being created
        resource: String,
        /// Underlying platform error
        source: PlatformError,
    },

    /// The platform rejected a destroy call
    #[error("failed to destroy {resource}: {source}")]
    DestroyFailed {
        /// The resource being destroyed
        resource: String,
        /// Underlying platform error
        source: PlatformError,
    },

    /// Resolved inputs differ from the recorded run and the change policy refuses
    #[error("inputs of {resource} changed since it was created")]
    InputsChanged {
        /// The resource whose inputs changed
        resource: String,
    },

    /// An output field was written twice
    #[error("output {resource}.{field} written twice")]
    DuplicateOutput {
        /// Producing resource
        resource: String,
        /// Output field
        field: String,
    },

    /// An output was read before its producer reached Ready, or never produced
    #[error("output {resource}.{field} not found")]
    OutputNotFound {
        /// Producing resource
        resource: String,
        /// Output field
        field: String,
    },

    /// The forward link exists but the reverse phase did not complete
    #[error("link pair {pair} is only established in the forward direction")]
    PartialLinkEstablished {
        /// Name of the link pair
        pair: String,
        /// Identifier of the forward link left in place
        forward_link_id: Option<String>,
    },

    /// The worker pool could not be built or went away mid-run
    #[error("scheduler failure: {0}")]
    Scheduler(String),
}

impl Error {
    /// Whether re-running the operation as-is may succeed.
    ///
    /// Gate timeouts and transient platform errors are retryable; construction
    /// errors and contract violations are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ResourceNotReady { .. } => true,
            Error::CreateFailed { source, .. } | Error::DestroyFailed { source, .. } => {
                source.is_retryable()
            }
            _ => false,
        }
    }

    /// Whether this error aborts the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::CycleDetected { .. }
                | Error::UnresolvedDependency { .. }
                | Error::DuplicateResource { .. }
                | Error::InvalidLinkPair { .. }
                | Error::DuplicateOutput { .. }
                | Error::OutputNotFound { .. }
                | Error::Scheduler(_)
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Transient.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::Permission.is_retryable());
    }

    #[test]
    fn test_create_failed_inherits_retryability() {
        let err = Error::CreateFailed {
            resource: "cluster-east".into(),
            source: PlatformError::transient("HTTP 503"),
        };
        assert!(err.is_retryable());
        assert!(!err.is_fatal());

        let err = Error::CreateFailed {
            resource: "cluster-east".into(),
            source: PlatformError::invalid("missing cku"),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_cycle_message_names_path() {
        let err = Error::CycleDetected {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle detected: a -> b -> a");
        assert!(err.is_fatal());
    }
}
