//! Declaration manifest
//!
//! The manifest is a YAML document with one map per resource kind, keyed by
//! the logical name used in resource addresses:
//!
//! ```yaml
//! buckets:
//!   data:
//!     name: data
//! users:
//!   alice:
//!     username: alice
//!     display_name: Alice
//! bucket_policies:
//!   data:
//!     bucket: data
//!     policy: '{"Version": "2012-10-17", "Statement": []}'
//! ```

use crate::error::{Error, Result};
use crate::resource::bucket::{BucketConfig, BucketPolicyConfig};
use crate::resource::user::UserConfig;
use crate::resource::{ResourceAddress, ResourceKind};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Declared resources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Users keyed by logical name
    #[serde(default)]
    pub users: IndexMap<String, UserConfig>,

    /// Buckets keyed by logical name
    #[serde(default)]
    pub buckets: IndexMap<String, BucketConfig>,

    /// Bucket policies keyed by logical name
    #[serde(default)]
    pub bucket_policies: IndexMap<String, BucketPolicyConfig>,
}

impl Manifest {
    /// Load and validate a manifest file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading manifest from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    /// Parse and validate a manifest document
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let manifest: Manifest = if raw.trim().is_empty() {
            Manifest::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Reject declarations the remote side cannot represent
    pub fn validate(&self) -> Result<()> {
        for (name, user) in &self.users {
            let address = ResourceAddress::new(ResourceKind::User, name);
            if user.username.is_empty() {
                return Err(invalid(&address, "username must not be empty"));
            }
            if user.username.contains('$') {
                return Err(invalid(&address, "username must not contain '$'"));
            }
            if user.tenant.as_deref().is_some_and(|t| t.is_empty() || t.contains('$')) {
                return Err(invalid(&address, "tenant must be non-empty and must not contain '$'"));
            }
            if user.display_name.is_empty() {
                return Err(invalid(&address, "display_name must not be empty"));
            }
            if user.max_buckets.is_some_and(|m| m < -1) {
                return Err(invalid(&address, "max_buckets must be -1 (disabled) or greater"));
            }
        }

        for (name, bucket) in &self.buckets {
            if bucket.name.is_empty() {
                let address = ResourceAddress::new(ResourceKind::Bucket, name);
                return Err(invalid(&address, "name must not be empty"));
            }
        }

        for (name, policy) in &self.bucket_policies {
            let address = ResourceAddress::new(ResourceKind::BucketPolicy, name);
            if policy.bucket.is_empty() {
                return Err(invalid(&address, "bucket must not be empty"));
            }
            if policy.policy.is_empty() {
                return Err(invalid(&address, "policy must not be empty"));
            }
        }

        Ok(())
    }

    /// Addresses of every declared resource, in apply order
    pub fn addresses(&self) -> Vec<ResourceAddress> {
        let mut out = Vec::new();
        for kind in ResourceKind::APPLY_ORDER {
            let names: Vec<&String> = match kind {
                ResourceKind::Bucket => self.buckets.keys().collect(),
                ResourceKind::User => self.users.keys().collect(),
                ResourceKind::BucketPolicy => self.bucket_policies.keys().collect(),
            };
            out.extend(names.into_iter().map(|n| ResourceAddress::new(kind, n)));
        }
        out
    }

    /// JSON schema of the manifest format
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Manifest)).unwrap_or_default()
    }
}

fn invalid(address: &ResourceAddress, reason: &str) -> Error {
    Error::Validation {
        address: address.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SAMPLE: &str = r#"
buckets:
  data:
    name: data
users:
  alice:
    username: alice
    display_name: Alice
    caps:
      - type: users
        perm: read
  bob:
    username: bob
    display_name: Bob
    tenant: acme
    generate_s3_credentials: false
bucket_policies:
  data:
    bucket: data
    policy: '{"Version": "2012-10-17", "Statement": []}'
"#;

    #[test]
    fn test_parse_sample() {
        let manifest = Manifest::from_yaml(SAMPLE).unwrap();
        assert_eq!(manifest.users.len(), 2);
        assert_eq!(manifest.users["alice"].caps[0].cap_type, "users");
        assert_eq!(manifest.users["bob"].tenant.as_deref(), Some("acme"));

        let addresses: Vec<String> = manifest.addresses().iter().map(|a| a.to_string()).collect();
        assert_eq!(
            addresses,
            vec!["bucket.data", "user.alice", "user.bob", "bucket_policy.data"]
        );
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = Manifest::from_yaml("  \n").unwrap();
        assert!(manifest.addresses().is_empty());
    }

    #[test]
    fn test_username_with_dollar_rejected() {
        let raw = "users:\n  x:\n    username: acme$alice\n    display_name: A\n";
        assert_matches!(
            Manifest::from_yaml(raw),
            Err(Error::Validation { address, .. }) if address == "user.x"
        );
    }

    #[test]
    fn test_tenant_with_dollar_rejected() {
        let raw = "users:\n  x:\n    username: alice\n    display_name: A\n    tenant: a$b\n";
        assert_matches!(Manifest::from_yaml(raw), Err(Error::Validation { .. }));
    }

    #[test]
    fn test_schema_mentions_users() {
        let schema = Manifest::json_schema();
        let text = schema.to_string();
        assert!(text.contains("generate_s3_credentials"));
        assert!(text.contains("bucket_policies"));
    }
}
