//! Domain Ports - Remote API boundaries for the reconciler
//!
//! These traits define the boundaries between the reconcile engine and the
//! two RadosGW interfaces: the administrative ("admin ops") API and the
//! S3-compatible data API. Adapters implement these traits to provide
//! concrete functionality.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// Remote Errors
// =============================================================================

/// Typed failure returned by the remote adapters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Admin API reported `NoSuchUser`
    #[error("NoSuchUser: {message}")]
    NoSuchUser { message: String },

    /// Any other 404 (`NoSuchBucket`, `NoSuchKey`, `NoSuchBucketPolicy`, ...)
    #[error("{code}: {message}")]
    NotFound { code: String, message: String },

    /// 403 from either API
    #[error("AccessDenied: {message}")]
    AccessDenied { message: String },

    /// 405, returned by S3 when the caller does not belong to the bucket owner
    #[error("MethodNotAllowed: {message}")]
    MethodNotAllowed { message: String },

    /// Any other non-success response
    #[error("HTTP {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Connection, TLS, timeout or decoding failure
    #[error("transport error: {message}")]
    Transport { message: String },
}

impl RemoteError {
    /// True for `NoSuchUser` and every other not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NoSuchUser { .. } | RemoteError::NotFound { .. })
    }

    /// True only for the admin API's `NoSuchUser`
    pub fn is_no_such_user(&self) -> bool {
        matches!(self, RemoteError::NoSuchUser { .. })
    }

    /// Build a typed error from an HTTP status and an RGW/S3 error code
    pub fn from_status(status: u16, code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match (status, code) {
            (_, "NoSuchUser") => RemoteError::NoSuchUser { message },
            (404, _) => RemoteError::NotFound {
                code: if code.is_empty() { "NotFound".into() } else { code.into() },
                message,
            },
            (403, _) | (_, "AccessDenied") => RemoteError::AccessDenied { message },
            (405, _) => RemoteError::MethodNotAllowed { message },
            _ => RemoteError::Api {
                status,
                code: code.into(),
                message,
            },
        }
    }
}

/// Result type for remote adapter calls
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

// =============================================================================
// Admin API Types
// =============================================================================

/// Capability granted to a user, e.g. `users=read`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct UserCap {
    /// Capability type (`users`, `buckets`, `metadata`, `usage`, `zone`, ...)
    #[serde(rename = "type")]
    pub cap_type: String,
    /// Permission (`read`, `write`, `*`)
    pub perm: String,
}

impl std::fmt::Display for UserCap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.cap_type, self.perm)
    }
}

/// S3 key pair as returned by the admin API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserKey {
    #[serde(default)]
    pub user: String,
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
}

/// User record as returned by the admin API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgwUser {
    pub user_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub suspended: Option<i64>,
    #[serde(default)]
    pub max_buckets: Option<i64>,
    #[serde(default)]
    pub keys: Vec<UserKey>,
    #[serde(default)]
    pub caps: Vec<UserCap>,
    #[serde(default)]
    pub op_mask: Option<String>,
}

/// Key type for generated credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    S3,
    Swift,
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyType::S3 => write!(f, "s3"),
            KeyType::Swift => write!(f, "swift"),
        }
    }
}

/// Create/modify request for a user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRequest {
    /// Full user id (`tenant$username` or `username`)
    pub uid: String,
    pub display_name: String,
    pub email: String,
    pub op_mask: String,
    pub caps: Vec<UserCap>,
    pub max_buckets: Option<i64>,
    pub suspended: Option<bool>,
    /// Key type to generate, if any
    pub key_type: Option<KeyType>,
    pub generate_key: bool,
}

/// Create request for an additional key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRequest {
    pub uid: String,
    pub key_type: KeyType,
    pub access_key: String,
    pub generate_key: bool,
}

// =============================================================================
// Admin API Port
// =============================================================================

/// Port for the RGW administrative identity API
#[async_trait]
pub trait AdminApi: Send + Sync {
    /// Create a user, optionally generating a key pair
    async fn create_user(&self, request: &UserRequest) -> RemoteResult<RgwUser>;

    /// Get a user including its full key list
    async fn get_user(&self, uid: &str) -> RemoteResult<RgwUser>;

    /// Modify a user; returns the full current record
    async fn modify_user(&self, request: &UserRequest) -> RemoteResult<RgwUser>;

    /// Remove a user, optionally purging its data
    async fn remove_user(&self, uid: &str, purge_data: bool) -> RemoteResult<()>;

    /// Create a key for a user; returns the user's full key list
    async fn create_key(&self, request: &KeyRequest) -> RemoteResult<Vec<UserKey>>;

    /// Remove an s3 key from a user
    async fn remove_key(&self, uid: &str, access_key: &str) -> RemoteResult<()>;
}

// =============================================================================
// Object Storage Port
// =============================================================================

/// Port for the S3-compatible data API
#[async_trait]
pub trait ObjectStorageApi: Send + Sync {
    /// Create a bucket
    async fn create_bucket(&self, bucket: &str) -> RemoteResult<()>;

    /// Check a bucket exists and is accessible
    async fn head_bucket(&self, bucket: &str) -> RemoteResult<()>;

    /// Delete a bucket
    async fn delete_bucket(&self, bucket: &str) -> RemoteResult<()>;

    /// Replace the policy document of a bucket
    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> RemoteResult<()>;

    /// Get the policy document of a bucket
    async fn get_bucket_policy(&self, bucket: &str) -> RemoteResult<String>;

    /// Remove the policy document of a bucket
    async fn delete_bucket_policy(&self, bucket: &str) -> RemoteResult<()>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type AdminApiRef = Arc<dyn AdminApi>;
pub type ObjectStorageApiRef = Arc<dyn ObjectStorageApi>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert_eq!(
            RemoteError::from_status(404, "NoSuchUser", "gone"),
            RemoteError::NoSuchUser {
                message: "gone".into()
            }
        );
        assert!(matches!(
            RemoteError::from_status(404, "NoSuchBucket", ""),
            RemoteError::NotFound { .. }
        ));
        assert!(RemoteError::from_status(404, "NoSuchUser", "").is_no_such_user());
        assert!(!RemoteError::from_status(404, "NoSuchBucket", "").is_no_such_user());
        assert!(RemoteError::from_status(404, "NoSuchBucket", "").is_not_found());
        assert!(matches!(
            RemoteError::from_status(403, "", ""),
            RemoteError::AccessDenied { .. }
        ));
        assert!(matches!(
            RemoteError::from_status(405, "MethodNotAllowed", ""),
            RemoteError::MethodNotAllowed { .. }
        ));
        assert!(matches!(
            RemoteError::from_status(409, "KeyExists", ""),
            RemoteError::Api { status: 409, .. }
        ));
    }

    #[test]
    fn test_rgw_user_decodes_admin_json() {
        let body = r#"{
            "user_id": "acme$alice",
            "display_name": "Alice",
            "email": "",
            "suspended": 0,
            "max_buckets": 1000,
            "keys": [{"user": "acme$alice", "access_key": "AK1", "secret_key": "SK1"}],
            "swift_keys": [],
            "caps": [{"type": "users", "perm": "read"}],
            "op_mask": "read, write, delete"
        }"#;

        let user: RgwUser = serde_json::from_str(body).unwrap();
        assert_eq!(user.user_id, "acme$alice");
        assert_eq!(user.keys.len(), 1);
        assert_eq!(user.caps[0].to_string(), "users=read");
        assert_eq!(user.suspended, Some(0));
    }

    #[test]
    fn test_key_type_display() {
        assert_eq!(format!("{}", KeyType::S3), "s3");
        assert_eq!(format!("{}", KeyType::Swift), "swift");
    }
}
