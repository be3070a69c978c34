//! Error types for the RGW reconciler
//!
//! Provides structured error types for the reconcile engine, the remote
//! client adapters and the local state/manifest handling.

use crate::domain::ports::RemoteError;
use thiserror::Error;

/// Unified error type for the reconciler
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation failed for {address}: {reason}")]
    Validation { address: String, reason: String },

    // =========================================================================
    // Remote Lookup Errors
    // =========================================================================
    #[error("Resource not found: {kind}/{name}")]
    NotFound { kind: String, name: String },

    #[error("Permission denied during {operation}: {message}")]
    PermissionDenied { operation: String, message: String },

    #[error("Wrong identity during {operation}: {message}")]
    WrongIdentity { operation: String, message: String },

    #[error("Admin API returned wrong user: expected '{expected}', got '{actual}'")]
    IdentityMismatch { expected: String, actual: String },

    // =========================================================================
    // Remote Call Errors
    // =========================================================================
    #[error("Could not create {kind} '{name}': {message}")]
    CreateFailed {
        kind: String,
        name: String,
        message: String,
    },

    #[error("Remote call failed: {operation}: {message}")]
    RemoteCallFailed { operation: String, message: String },

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    // =========================================================================
    // Credential Errors
    // =========================================================================
    #[error("API didn't return exactly one s3 key pair for user '{user_id}': got {count}")]
    UnexpectedKeyCount { user_id: String, count: usize },

    #[error(
        "Could not find expected s3 credentials in API response: got {returned} key pairs, \
         none of them matched the access key '{access_key}'"
    )]
    KeyGenerationMismatch { access_key: String, returned: usize },

    // =========================================================================
    // Local State Errors
    // =========================================================================
    #[error("State file error: {0}")]
    StateFile(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a remote failure for `operation`, keeping the remote error text
    pub fn remote(operation: impl Into<String>, err: RemoteError) -> Self {
        let operation = operation.into();
        match err {
            RemoteError::AccessDenied { message } => Error::PermissionDenied { operation, message },
            RemoteError::MethodNotAllowed { message } => Error::WrongIdentity { operation, message },
            other => Error::RemoteCallFailed {
                operation,
                message: other.to_string(),
            },
        }
    }

    /// Short summary line used when the error is rendered as a diagnostic
    pub fn summary(&self) -> &'static str {
        match self {
            Error::Internal(_) => "internal error",
            Error::Configuration(_) => "invalid configuration",
            Error::Validation { .. } => "invalid declaration",
            Error::NotFound { .. } => "resource not found",
            Error::PermissionDenied { .. } => "permission denied",
            Error::WrongIdentity { .. } => "wrong identity",
            Error::IdentityMismatch { .. } => "api returned wrong user",
            Error::CreateFailed { .. } => "could not create resource",
            Error::RemoteCallFailed { .. } => "remote call failed",
            Error::Cancelled { .. } => "operation cancelled",
            Error::UnexpectedKeyCount { .. } => "api didn't return exactly one s3 key pair",
            Error::KeyGenerationMismatch { .. } => {
                "could not find expected s3 credentials in api response"
            }
            Error::StateFile(_) | Error::JsonParse(_) | Error::YamlParse(_) | Error::Io(_) => {
                "local state error"
            }
        }
    }

    /// Attribute the error refers to, if any
    pub fn attribute(&self) -> Option<&'static str> {
        match self {
            Error::UnexpectedKeyCount { .. } | Error::KeyGenerationMismatch { .. } => {
                Some("secret_key")
            }
            _ => None,
        }
    }

    /// Check if this error leaves the remote side untouched, so that re-running
    /// the same pass is safe
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
            || matches!(self, Error::RemoteCallFailed { message, .. } if message.starts_with("transport"))
    }
}

/// Result type alias for the reconciler
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_classification() {
        let err = Error::remote(
            "head bucket",
            RemoteError::AccessDenied {
                message: "denied".into(),
            },
        );
        assert!(matches!(err, Error::PermissionDenied { .. }));

        let err = Error::remote(
            "get bucket policy",
            RemoteError::MethodNotAllowed {
                message: "not owner".into(),
            },
        );
        assert!(matches!(err, Error::WrongIdentity { .. }));

        let err = Error::remote(
            "get user",
            RemoteError::Api {
                status: 500,
                code: "InternalError".into(),
                message: "boom".into(),
            },
        );
        match err {
            Error::RemoteCallFailed { operation, message } => {
                assert_eq!(operation, "get user");
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_key_errors_point_at_secret_key() {
        let err = Error::UnexpectedKeyCount {
            user_id: "alice".into(),
            count: 2,
        };
        assert_eq!(err.attribute(), Some("secret_key"));
        assert!(err.to_string().contains("got 2"));

        let err = Error::KeyGenerationMismatch {
            access_key: "AK1".into(),
            returned: 3,
        };
        assert!(err.to_string().contains("'AK1'"));
    }

    #[test]
    fn test_transient() {
        let err = Error::Cancelled {
            operation: "modify user".into(),
        };
        assert!(err.is_transient());

        let err = Error::Configuration("bad".into());
        assert!(!err.is_transient());
    }
}
