//! RGW user resource
//!
//! Declared configuration, planned record and observed record of a user.

use crate::domain::ports::UserCap;
use crate::resource::value::PlanValue;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Declared Configuration
// =============================================================================

/// Ceph RGW user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UserConfig {
    /// The user ID to be created (without tenant). Must not contain `$`.
    pub username: String,

    /// Display name of the user
    pub display_name: String,

    /// The email address associated with the user
    #[serde(default)]
    pub email: Option<String>,

    /// Whether to generate S3 credentials for the user (default `true`)
    #[serde(default)]
    pub generate_s3_credentials: Option<bool>,

    /// How to deal with S3 credentials not managed by this resource.
    /// `true` deletes all other S3 credentials, `false` ignores them
    /// (default `true`).
    #[serde(default)]
    pub exclusive_s3_credentials: Option<bool>,

    /// Capabilities granted to the user
    #[serde(default)]
    pub caps: Vec<UserCap>,

    /// The op-mask of the user (default `read, write, delete`)
    #[serde(default)]
    pub op_mask: Option<String>,

    /// Maximum number of buckets the user can own (default `1000`)
    #[serde(default)]
    pub max_buckets: Option<i64>,

    /// Whether the user should be suspended (default `false`)
    #[serde(default)]
    pub suspended: Option<bool>,

    /// The tenant the user is a part of
    #[serde(default)]
    pub tenant: Option<String>,

    /// Purge user data on deletion
    #[serde(default)]
    pub purge_data_on_delete: Option<bool>,
}

// =============================================================================
// Planned Record
// =============================================================================

/// Desired user record after default resolution and unknown marking
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserPlan {
    pub id: PlanValue<String>,
    pub username: String,
    pub tenant: Option<String>,
    pub display_name: String,
    pub email: Option<String>,
    pub generate_s3_credentials: Option<bool>,
    pub exclusive_s3_credentials: Option<bool>,
    pub caps: Vec<UserCap>,
    pub op_mask: PlanValue<String>,
    pub max_buckets: PlanValue<i64>,
    pub suspended: PlanValue<bool>,
    pub access_key: PlanValue<String>,
    pub secret_key: PlanValue<String>,
    pub purge_data_on_delete: Option<bool>,
    /// The last read saw keys other than the managed one and the exclusive
    /// policy asks for their removal
    pub remove_unmanaged_keys: bool,
}

impl UserPlan {
    /// Unset counts as enabled
    pub fn generates_credentials(&self) -> bool {
        self.generate_s3_credentials.unwrap_or(true)
    }

    /// Unset counts as exclusive
    pub fn exclusive_credentials(&self) -> bool {
        self.exclusive_s3_credentials.unwrap_or(true)
    }

    /// True when the remote identity differs from the recorded one
    pub fn requires_replace(&self, prior: &UserState) -> bool {
        self.username != prior.username || self.tenant != prior.tenant
    }

    /// True when applying the plan would change anything
    pub fn has_changes(&self, prior: &UserState) -> bool {
        self.requires_replace(prior)
            || self.display_name != prior.display_name
            || self.email != prior.email
            || self.caps != prior.caps
            || self.generate_s3_credentials != prior.generate_s3_credentials
            || self.exclusive_s3_credentials != prior.exclusive_s3_credentials
            || self.purge_data_on_delete != prior.purge_data_on_delete
            || self.op_mask.known() != Some(&prior.op_mask)
            || self.max_buckets.known() != Some(&prior.max_buckets)
            || self.suspended.known() != Some(&prior.suspended)
            || self.access_key.known() != prior.access_key.as_ref()
            || self.secret_key.known() != prior.secret_key.as_ref()
            || self.access_key.is_unknown()
            || self.secret_key.is_unknown()
            || self.remove_unmanaged_keys
    }

    /// Names of attributes that differ from the prior record
    pub fn changed_attributes(&self, prior: &UserState) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.username != prior.username {
            changed.push("username");
        }
        if self.tenant != prior.tenant {
            changed.push("tenant");
        }
        if self.display_name != prior.display_name {
            changed.push("display_name");
        }
        if self.email != prior.email {
            changed.push("email");
        }
        if self.caps != prior.caps {
            changed.push("caps");
        }
        if self.op_mask.known() != Some(&prior.op_mask) {
            changed.push("op_mask");
        }
        if self.max_buckets.known() != Some(&prior.max_buckets) {
            changed.push("max_buckets");
        }
        if self.suspended.known() != Some(&prior.suspended) {
            changed.push("suspended");
        }
        if self.access_key.is_unknown() || self.access_key.known() != prior.access_key.as_ref() {
            changed.push("access_key");
        }
        if self.secret_key.is_unknown() || self.secret_key.known() != prior.secret_key.as_ref() {
            changed.push("secret_key");
        }
        changed
    }
}

// =============================================================================
// Observed Record
// =============================================================================

/// User record as persisted after a successful reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub tenant: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub generate_s3_credentials: Option<bool>,
    #[serde(default)]
    pub exclusive_s3_credentials: Option<bool>,
    #[serde(default)]
    pub caps: Vec<UserCap>,
    pub op_mask: String,
    pub max_buckets: i64,
    pub suspended: bool,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub purge_data_on_delete: Option<bool>,
}

impl UserState {
    /// Unset counts as enabled
    pub fn generates_credentials(&self) -> bool {
        self.generate_s3_credentials.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> UserState {
        UserState {
            id: "alice".into(),
            username: "alice".into(),
            tenant: None,
            display_name: "Alice".into(),
            email: None,
            generate_s3_credentials: None,
            exclusive_s3_credentials: None,
            caps: vec![],
            op_mask: "read, write, delete".into(),
            max_buckets: 1000,
            suspended: false,
            access_key: Some("AK1".into()),
            secret_key: Some("SK1".into()),
            purge_data_on_delete: None,
        }
    }

    fn plan_from(state: &UserState) -> UserPlan {
        UserPlan {
            id: PlanValue::Known(state.id.clone()),
            username: state.username.clone(),
            tenant: state.tenant.clone(),
            display_name: state.display_name.clone(),
            email: state.email.clone(),
            generate_s3_credentials: state.generate_s3_credentials,
            exclusive_s3_credentials: state.exclusive_s3_credentials,
            caps: state.caps.clone(),
            op_mask: PlanValue::Known(state.op_mask.clone()),
            max_buckets: PlanValue::Known(state.max_buckets),
            suspended: PlanValue::Known(state.suspended),
            access_key: PlanValue::from_option(state.access_key.clone()),
            secret_key: PlanValue::from_option(state.secret_key.clone()),
            purge_data_on_delete: state.purge_data_on_delete,
            remove_unmanaged_keys: false,
        }
    }

    #[test]
    fn test_identical_plan_has_no_changes() {
        let prior = state();
        let plan = plan_from(&prior);
        assert!(!plan.has_changes(&prior));
        assert!(plan.changed_attributes(&prior).is_empty());
    }

    #[test]
    fn test_unknown_secret_is_a_change() {
        let prior = state();
        let mut plan = plan_from(&prior);
        plan.secret_key = PlanValue::Unknown;
        assert!(plan.has_changes(&prior));
        assert_eq!(plan.changed_attributes(&prior), vec!["secret_key"]);
    }

    #[test]
    fn test_tenant_change_requires_replace() {
        let prior = state();
        let mut plan = plan_from(&prior);
        plan.tenant = Some("acme".into());
        assert!(plan.requires_replace(&prior));
        assert!(plan.has_changes(&prior));
    }

    #[test]
    fn test_config_decodes_with_defaults() {
        let config: UserConfig =
            serde_yaml::from_str("username: alice\ndisplay_name: Alice\n").unwrap();
        assert_eq!(config.email, None);
        assert!(config.caps.is_empty());
        assert_eq!(config.generate_s3_credentials, None);

        let err = serde_yaml::from_str::<UserConfig>("username: a\ndisplay_name: A\nbogus: 1\n");
        assert!(err.is_err());
    }
}
