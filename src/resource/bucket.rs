//! Bucket and bucket policy resources

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Bucket
// =============================================================================

/// Bucket in Ceph RGW
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BucketConfig {
    /// Bucket name
    pub name: String,
}

/// Bucket record as persisted after a successful reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketState {
    pub id: String,
    pub name: String,
}

impl BucketConfig {
    /// The bucket name is immutable
    pub fn requires_replace(&self, prior: &BucketState) -> bool {
        self.name != prior.name
    }
}

// =============================================================================
// Bucket Policy
// =============================================================================

/// Bucket policy in Ceph RGW
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BucketPolicyConfig {
    /// Bucket name
    pub bucket: String,

    /// Bucket policy document, passed to RGW verbatim
    pub policy: String,
}

/// Bucket policy record as persisted after a successful reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketPolicyState {
    pub id: String,
    pub bucket: String,
    pub policy: String,
}

impl BucketPolicyConfig {
    /// The bucket a policy is attached to is immutable
    pub fn requires_replace(&self, prior: &BucketPolicyState) -> bool {
        self.bucket != prior.bucket
    }

    /// Policies are replaced wholesale, so any text difference is a change
    pub fn has_changes(&self, prior: &BucketPolicyState) -> bool {
        self.requires_replace(prior) || self.policy != prior.policy
    }
}
