//! Plan construction
//!
//! Turns a declared user, the prior observed record and the hidden state of
//! the previous pass into the planned record an update or create works from.

use crate::reconcile::defaults::{resolve_max_buckets, resolve_op_mask, resolve_suspended};
use crate::reconcile::hidden_state::CredentialFlags;
use crate::resource::{PlanValue, UserConfig, UserPlan, UserState};
use tracing::debug;

/// Build the planned record of a user
pub fn plan_user(
    config: &UserConfig,
    prior: Option<&UserState>,
    private: Option<CredentialFlags>,
) -> UserPlan {
    let op_mask = resolve_op_mask(
        config.op_mask.as_deref(),
        prior.map(|p| PlanValue::Known(p.op_mask.clone())).unwrap_or_default(),
    );
    let max_buckets = resolve_max_buckets(
        config.max_buckets,
        prior.map(|p| PlanValue::Known(p.max_buckets)).unwrap_or_default(),
    );
    let suspended = resolve_suspended(
        config.suspended,
        prior.map(|p| PlanValue::Known(p.suspended)).unwrap_or_default(),
    );

    let generate = config.generate_s3_credentials.unwrap_or(true);
    let exclusive = config.exclusive_s3_credentials.unwrap_or(true);
    let flags = private.unwrap_or_default();

    let (access_key, secret_key) = if generate {
        let access = prior
            .and_then(|p| p.access_key.clone())
            .map(PlanValue::Known)
            .unwrap_or(PlanValue::Unknown)
            .unknown_if(flags.access_key_unresolved);
        let secret = prior
            .and_then(|p| p.secret_key.clone())
            .map(PlanValue::Known)
            .unwrap_or(PlanValue::Unknown)
            .unknown_if(flags.secret_key_unresolved || access.is_unknown());
        (access, secret)
    } else {
        (PlanValue::Null, PlanValue::Null)
    };

    debug!(
        username = %config.username,
        access_key_unknown = access_key.is_unknown(),
        secret_key_unknown = secret_key.is_unknown(),
        "Planned user credentials"
    );

    UserPlan {
        id: prior
            .map(|p| PlanValue::Known(p.id.clone()))
            .unwrap_or(PlanValue::Unknown),
        username: config.username.clone(),
        tenant: config.tenant.clone(),
        display_name: config.display_name.clone(),
        email: config.email.clone(),
        generate_s3_credentials: config.generate_s3_credentials,
        exclusive_s3_credentials: config.exclusive_s3_credentials,
        caps: config.caps.clone(),
        op_mask,
        max_buckets,
        suspended,
        access_key,
        secret_key,
        purge_data_on_delete: config.purge_data_on_delete,
        remove_unmanaged_keys: generate && exclusive && flags.unmanaged_keys,
    }
}
