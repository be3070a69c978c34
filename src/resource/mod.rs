//! Resource Definitions
//!
//! Declared configuration, planned and observed records for the three
//! resource kinds managed on RGW.

pub mod bucket;
pub mod manifest;
pub mod user;
pub mod value;

pub use bucket::*;
pub use manifest::Manifest;
pub use user::*;
pub use value::PlanValue;

use serde::{Deserialize, Serialize};

// =============================================================================
// Resource Kinds
// =============================================================================

/// Kinds of resource managed by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Bucket,
    User,
    BucketPolicy,
}

impl ResourceKind {
    /// Order in which creates and updates are applied; deletes run in reverse
    pub const APPLY_ORDER: [ResourceKind; 3] = [
        ResourceKind::Bucket,
        ResourceKind::User,
        ResourceKind::BucketPolicy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Bucket => "bucket",
            ResourceKind::User => "user",
            ResourceKind::BucketPolicy => "bucket_policy",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Address of a resource: `<kind>.<logical name>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceAddress {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceAddress {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Parse `<kind>.<name>`
    pub fn parse(raw: &str) -> Option<Self> {
        let (kind, name) = raw.split_once('.')?;
        let kind = match kind {
            "bucket" => ResourceKind::Bucket,
            "user" => ResourceKind::User,
            "bucket_policy" => ResourceKind::BucketPolicy,
            _ => return None,
        };
        if name.is_empty() {
            return None;
        }
        Some(Self::new(kind, name))
    }
}

impl std::fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}
