//! Error types for the snapshot data-mover plugin
//!
//! Errors are structured with fields naming the operation and the resource
//! involved, so a failed item in a backup or restore log points straight at
//! the object that needs attention.

use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for data-mover orchestration
#[derive(Debug, Error)]
pub enum Error {
    /// No reachable cluster configuration
    #[error("configuration error: {message}")]
    Config {
        /// Description of what failed
        message: String,
    },

    /// Kubernetes API call failed
    #[error("{operation} {resource} failed: {source}")]
    Client {
        /// Operation that failed (get, create, patch, delete)
        operation: String,
        /// Resource identity, `Kind namespace/name` or `Kind name`
        resource: String,
        /// The underlying kube-rs error
        #[source]
        source: kube::Error,
    },

    /// A poll deadline expired
    #[error("timed out after {elapsed:?} waiting for {description} (last state: {last_state})")]
    Timeout {
        /// What was being waited for
        description: String,
        /// Time spent waiting
        elapsed: Duration,
        /// Last condition state observed before the deadline
        last_state: String,
    },

    /// An upstream resource that an earlier stage should have created is missing
    #[error("{kind} {namespace}/{name} not found")]
    DependencyNotFound {
        /// Resource kind
        kind: String,
        /// Resource namespace (empty for cluster-scoped resources)
        namespace: String,
        /// Resource name
        name: String,
    },

    /// A mover backup request reached a terminal phase other than Completed
    #[error("mover request {name} did not complete (phase: {phase})")]
    IncompleteMover {
        /// Request name
        name: String,
        /// Phase the request ended in
        phase: String,
    },

    /// A mover backup request carries neither status nor annotations
    #[error("mover request {name} has no completion data: {message}")]
    MissingMoverResult {
        /// Request name
        name: String,
        /// What is missing
        message: String,
    },

    /// A deterministically named resource exists but describes another entity
    #[error("conflict on {resource}: {message}")]
    Conflict {
        /// Resource identity
        resource: String,
        /// Description of the mismatch
        message: String,
    },

    /// An item handed to an action is missing required data
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Resource identity
        resource: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being converted (if known)
        kind: Option<String>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap a kube error with the operation and resource it belongs to
    pub fn client(
        operation: impl Into<String>,
        resource: impl Into<String>,
        source: kube::Error,
    ) -> Self {
        Self::Client {
            operation: operation.into(),
            resource: resource.into(),
            source,
        }
    }

    /// Create a timeout error
    pub fn timeout(
        description: impl Into<String>,
        elapsed: Duration,
        last_state: impl Into<String>,
    ) -> Self {
        Self::Timeout {
            description: description.into(),
            elapsed,
            last_state: last_state.into(),
        }
    }

    /// Create a dependency-not-found error
    pub fn dependency_not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::DependencyNotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error for a resource
    pub fn validation(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// HTTP status code of the underlying API error, if any
    fn api_code(&self) -> Option<u16> {
        match self {
            Error::Client {
                source: kube::Error::Api(ae),
                ..
            } => Some(ae.code),
            _ => None,
        }
    }

    /// Whether the API server answered 404
    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    /// Whether the API server answered 409 AlreadyExists
    pub fn is_already_exists(&self) -> bool {
        match self {
            Error::Client {
                source: kube::Error::Api(ae),
                ..
            } => ae.code == 409 && ae.reason == "AlreadyExists",
            _ => false,
        }
    }

    /// Check if this error is retryable by the surrounding pipeline
    ///
    /// Only transient client failures are worth retrying. Everything else
    /// indicates an ordering bug, bad input, or a mover that gave up.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Client { source, .. } => {
                // 4xx means the request itself is wrong; retrying won't help
                !matches!(source, kube::Error::Api(ae) if (400..500).contains(&ae.code))
            }
            Error::Timeout { .. } => true,
            Error::Config { .. }
            | Error::DependencyNotFound { .. }
            | Error::IncompleteMover { .. }
            | Error::MissingMoverResult { .. }
            | Error::Conflict { .. }
            | Error::Validation { .. }
            | Error::Serialization { .. } => false,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use kube::core::ErrorResponse;

    /// Build a kube API error with the given code and reason
    pub fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} ({code})"),
            reason: reason.to_string(),
            code,
        })
    }
}
