//! Error taxonomy for provisioning workflows
//!
//! Two layers of error exist:
//!
//! - [`ServiceError`] is what a collaborator (control plane, archive sink,
//!   function invoker) returns. It carries a [`ServiceErrorKind`] so callers can
//!   tell an absent resource from a real failure without looking at message text.
//! - [`JitpError`] is what a workflow returns. Collaborator failures are wrapped
//!   transparently in [`JitpError::Remote`] so the original cause reaches the
//!   trigger system unmodified.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a collaborator failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    /// The addressed resource does not exist
    NotFound,
    /// The resource (or relation) being created already exists
    AlreadyExists,
    /// The service rejected the call because of request rate
    Throttled,
    /// The call did not complete within its bound
    Timeout,
    /// The service could not be reached
    Unavailable,
    /// Any other failure
    Other,
}

impl ServiceErrorKind {
    /// Whether a retry of the same call may succeed without any state change.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Throttled | Self::Timeout | Self::Unavailable)
    }
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::Throttled => "throttled",
            Self::Timeout => "timed out",
            Self::Unavailable => "unavailable",
            Self::Other => "failed",
        };
        f.write_str(label)
    }
}

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{operation} {kind}: {message}")]
pub struct ServiceError {
    /// What went wrong, in a form callers can dispatch on
    pub kind: ServiceErrorKind,
    /// Name of the remote operation, e.g. `DeletePolicy`
    pub operation: String,
    /// Free-form detail from the service
    pub message: String,
}

impl ServiceError {
    /// Create a service error of the given kind
    pub fn new(
        kind: ServiceErrorKind,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::NotFound, operation, message)
    }

    /// Create an already exists error
    pub fn already_exists(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::AlreadyExists, operation, message)
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Timeout, operation, message)
    }

    /// Create an unclassified failure
    pub fn other(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Other, operation, message)
    }

    /// Kind of this failure
    pub fn kind(&self) -> ServiceErrorKind {
        self.kind
    }

    /// Shorthand for `kind() == NotFound`
    pub fn is_not_found(&self) -> bool {
        self.kind == ServiceErrorKind::NotFound
    }

    /// Shorthand for `kind() == AlreadyExists`
    pub fn is_already_exists(&self) -> bool {
        self.kind == ServiceErrorKind::AlreadyExists
    }
}

/// Coarse classification of a workflow failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A trigger payload is missing a required field
    MalformedInput,
    /// The certificate body could not be parsed
    MalformedCredential,
    /// The certificate subject carries no common name
    MissingIdentity,
    /// A device record required by the operation does not exist
    RecordNotFound,
    /// A collaborator failed; see the wrapped [`ServiceErrorKind`]
    Remote(ServiceErrorKind),
    /// Invalid configuration
    Configuration,
    /// Payload encoding failed
    Serialization,
}

/// Unified error type for provisioning workflows
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum JitpError {
    /// Missing or invalid field in a trigger payload
    #[error("Malformed input: {message}")]
    MalformedInput {
        /// What is missing or wrong
        message: String,
    },

    /// The credential body is not a parseable certificate
    #[error("Malformed credential: {message}")]
    MalformedCredential {
        /// Parser detail
        message: String,
    },

    /// The certificate has no subject common name
    #[error("Missing identity: {message}")]
    MissingIdentity {
        /// Which credential lacked an identity
        message: String,
    },

    /// The device record does not exist
    #[error("Record not found: {thing_name}")]
    RecordNotFound {
        /// Name of the absent record
        thing_name: String,
    },

    /// A collaborator call failed
    #[error(transparent)]
    Remote(#[from] ServiceError),

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// Which setting is invalid and why
        message: String,
    },

    /// Encoding or decoding a payload failed
    #[error("Serialization error: {message}")]
    Serialization {
        /// Codec detail
        message: String,
    },
}

impl JitpError {
    /// Create a malformed input error
    pub fn malformed_input(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
        }
    }

    /// Create a malformed credential error
    pub fn malformed_credential(message: impl Into<String>) -> Self {
        Self::MalformedCredential {
            message: message.into(),
        }
    }

    /// Create a missing identity error
    pub fn missing_identity(message: impl Into<String>) -> Self {
        Self::MissingIdentity {
            message: message.into(),
        }
    }

    /// Create a record not found error
    pub fn record_not_found(thing_name: impl Into<String>) -> Self {
        Self::RecordNotFound {
            thing_name: thing_name.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedInput { .. } => ErrorKind::MalformedInput,
            Self::MalformedCredential { .. } => ErrorKind::MalformedCredential,
            Self::MissingIdentity { .. } => ErrorKind::MissingIdentity,
            Self::RecordNotFound { .. } => ErrorKind::RecordNotFound,
            Self::Remote(err) => ErrorKind::Remote(err.kind),
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Serialization { .. } => ErrorKind::Serialization,
        }
    }

    /// Whether the run aborted before touching any policy or record.
    ///
    /// Input and identity failures are detected before the first mutation of
    /// access state; everything else may have happened mid-sequence.
    pub fn is_pre_mutation(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MalformedInput | ErrorKind::MalformedCredential | ErrorKind::MissingIdentity
        )
    }
}

/// Standard Result type for provisioning operations
pub type JitpResult<T> = std::result::Result<T, JitpError>;

impl From<serde_json::Error> for JitpError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
