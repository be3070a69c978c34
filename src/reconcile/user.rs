//! User reconciler
//!
//! Create/Read/Update/Delete for RGW users, including management of the one
//! S3 key pair each user record owns.
//!
//! The managed key pair follows a small state machine across passes:
//!
//! ```text
//!   create ──► resolved ──read: key missing──► unresolved
//!                 ▲                                │
//!                 └──── update: recover/regenerate ◄┘
//! ```
//!
//! Unresolved fields are remembered in [`CredentialFlags`] so the next plan
//! presents them as unknown and the following update repairs them.

use crate::domain::ports::{AdminApiRef, KeyRequest, KeyType, RgwUser, UserRequest};
use crate::error::{Error, Result};
use crate::reconcile::credentials::{find_key, generate_access_key, unmanaged_keys};
use crate::reconcile::defaults::{DEFAULT_MAX_BUCKETS, DEFAULT_OP_MASK, DEFAULT_SUSPENDED};
use crate::reconcile::identity::{compose_user_id, UserId};
use crate::reconcile::{guarded, Applied, CredentialFlags, Diagnostics, ReadOutcome, Reconciler};
use crate::resource::{PlanValue, ResourceKind, UserPlan, UserState};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reconciler for RGW users
pub struct UserReconciler {
    admin: AdminApiRef,
}

impl UserReconciler {
    pub fn new(admin: AdminApiRef) -> Self {
        Self { admin }
    }

    fn request_from_plan(plan: &UserPlan, uid: String) -> UserRequest {
        UserRequest {
            uid,
            display_name: plan.display_name.clone(),
            email: plan.email.clone().unwrap_or_default(),
            op_mask: plan
                .op_mask
                .known()
                .cloned()
                .unwrap_or_else(|| DEFAULT_OP_MASK.to_string()),
            caps: plan.caps.clone(),
            max_buckets: Some(plan.max_buckets.known().copied().unwrap_or(DEFAULT_MAX_BUCKETS)),
            suspended: Some(plan.suspended.known().copied().unwrap_or(DEFAULT_SUSPENDED)),
            key_type: None,
            generate_key: false,
        }
    }

    fn record_from_request(plan: &UserPlan, request: &UserRequest, id: String) -> UserState {
        UserState {
            id,
            username: plan.username.clone(),
            tenant: plan.tenant.clone(),
            display_name: plan.display_name.clone(),
            email: plan.email.clone(),
            generate_s3_credentials: plan.generate_s3_credentials,
            exclusive_s3_credentials: plan.exclusive_s3_credentials,
            caps: plan.caps.clone(),
            op_mask: request.op_mask.clone(),
            max_buckets: request.max_buckets.unwrap_or(DEFAULT_MAX_BUCKETS),
            suspended: request.suspended.unwrap_or(DEFAULT_SUSPENDED),
            access_key: None,
            secret_key: None,
            purge_data_on_delete: plan.purge_data_on_delete,
        }
    }

    /// Merge an admin API user into a prior record
    fn merge_remote(prior: &UserState, user: &RgwUser) -> UserState {
        let mut record = prior.clone();

        let id = UserId::parse(&user.user_id);
        record.username = id.username;
        record.tenant = id.tenant;
        record.display_name = user.display_name.clone();

        // An address that was never declared stays unset
        if !user.email.is_empty() || prior.email.is_some() {
            record.email = Some(user.email.clone());
        }

        record.caps = user.caps.clone();
        if let Some(max_buckets) = user.max_buckets {
            record.max_buckets = max_buckets;
        }
        if let Some(suspended) = user.suspended {
            record.suspended = suspended >= 1;
        }
        record
    }
}

#[async_trait]
impl Reconciler for UserReconciler {
    type Plan = UserPlan;
    type State = UserState;

    fn kind(&self) -> ResourceKind {
        ResourceKind::User
    }

    async fn create(&self, plan: &UserPlan, cancel: &CancellationToken) -> Result<Applied<UserState>> {
        let uid = compose_user_id(plan.tenant.as_deref(), &plan.username);
        let generate = plan.generates_credentials();

        let mut request = Self::request_from_plan(plan, uid.clone());
        if generate {
            request.key_type = Some(KeyType::S3);
            request.generate_key = true;
        }

        info!("Creating RGW user {}", uid);
        let created = match guarded(cancel, "create user", self.admin.create_user(&request)).await? {
            Ok(user) => user,
            Err(e) => {
                return Err(Error::CreateFailed {
                    kind: ResourceKind::User.to_string(),
                    name: uid,
                    message: e.to_string(),
                })
            }
        };

        let id = if created.user_id.is_empty() {
            uid
        } else {
            created.user_id.clone()
        };
        let mut record = Self::record_from_request(plan, &request, id);

        if generate {
            if created.keys.len() != 1 {
                return Err(Error::UnexpectedKeyCount {
                    user_id: record.id,
                    count: created.keys.len(),
                });
            }
            let key = &created.keys[0];
            record.access_key = Some(key.access_key.clone());
            record.secret_key = Some(key.secret_key.clone());
        }

        info!("Created RGW user {}", record.id);
        Ok(Applied::new(record).with_private(CredentialFlags::resolved()))
    }

    async fn read(&self, prior: &UserState, cancel: &CancellationToken) -> Result<ReadOutcome<UserState>> {
        debug!("Reading RGW user {}", prior.id);
        let user = match guarded(cancel, "get user", self.admin.get_user(&prior.id)).await? {
            Ok(user) => user,
            Err(e) if e.is_no_such_user() => {
                warn!("RGW user {} no longer exists", prior.id);
                return Ok(ReadOutcome::Removed);
            }
            Err(e) => return Err(Error::remote("get user", e)),
        };

        if user.user_id != prior.id {
            return Err(Error::IdentityMismatch {
                expected: prior.id.clone(),
                actual: user.user_id,
            });
        }

        let mut record = Self::merge_remote(prior, &user);
        let mut flags = CredentialFlags::default();
        let mut diagnostics = Diagnostics::new();

        if record.generates_credentials() {
            flags.access_key_unresolved = record.access_key.is_none();

            let managed = record
                .access_key
                .as_deref()
                .and_then(|access_key| find_key(&user.keys, access_key));
            match managed {
                Some(key) => record.secret_key = Some(key.secret_key.clone()),
                None => flags.secret_key_unresolved = true,
            }

            let others: Vec<String> = unmanaged_keys(&user.keys, record.access_key.as_deref())
                .map(|k| k.access_key.clone())
                .collect();
            if !others.is_empty() {
                flags.unmanaged_keys = true;
                if record.exclusive_s3_credentials.unwrap_or(true) {
                    diagnostics.add_warning(
                        "unmanaged s3 credentials",
                        format!(
                            "user '{}' has access keys not managed here ({}); they will be removed on the next apply",
                            record.id,
                            others.join(", ")
                        ),
                    );
                }
            }

            if flags.any_unresolved() {
                info!(
                    "RGW user {} credentials unresolved (access key: {}, secret key: {})",
                    record.id, flags.access_key_unresolved, flags.secret_key_unresolved
                );
            }
        } else {
            record.access_key = None;
            record.secret_key = None;
        }

        Ok(ReadOutcome::Present(
            Applied::new(record)
                .with_private(flags)
                .with_diagnostics(diagnostics),
        ))
    }

    async fn update(
        &self,
        plan: &UserPlan,
        prior: &UserState,
        cancel: &CancellationToken,
    ) -> Result<Applied<UserState>> {
        let request = Self::request_from_plan(plan, prior.id.clone());

        info!("Modifying RGW user {}", prior.id);
        let user = guarded(cancel, "modify user", self.admin.modify_user(&request))
            .await?
            .map_err(|e| Error::remote("modify user", e))?;

        // RGW may normalize or drop requested values; keep what it reports
        let requested = Self::record_from_request(plan, &request, prior.id.clone());
        let mut record = if user.user_id == prior.id {
            Self::merge_remote(&requested, &user)
        } else {
            requested
        };
        let mut diagnostics = Diagnostics::new();

        if !plan.generates_credentials() {
            return Ok(Applied::new(record).with_private(CredentialFlags::resolved()));
        }

        let mut access_key = plan.access_key.clone();
        let mut secret_key = plan.secret_key.clone();
        info!(
            "RGW user {} access key unknown: {}, secret key unknown: {}",
            prior.id,
            access_key.is_unknown(),
            secret_key.is_unknown()
        );

        let mut remaining_unmanaged = 0;
        if secret_key.is_unknown() || plan.remove_unmanaged_keys {
            for key in &user.keys {
                if access_key.known() == Some(&key.access_key) {
                    if secret_key.is_unknown() {
                        debug!("Recovered secret of access key {}", key.access_key);
                        secret_key = PlanValue::Known(key.secret_key.clone());
                    }
                    continue;
                }

                if !plan.exclusive_credentials() {
                    remaining_unmanaged += 1;
                    continue;
                }

                info!("Removing unmanaged access key {} of RGW user {}", key.access_key, user.user_id);
                let removed = guarded(cancel, "remove key", self.admin.remove_key(&user.user_id, &key.access_key)).await?;
                if let Err(e) = removed {
                    remaining_unmanaged += 1;
                    diagnostics.add_error(format!("could not remove access key '{}'", key.access_key), e.to_string());
                }
            }
        } else {
            remaining_unmanaged = unmanaged_keys(&user.keys, access_key.known().map(String::as_str)).count();
        }

        if secret_key.is_unknown() {
            let access = match access_key.known() {
                Some(access) => access.clone(),
                None => generate_access_key(),
            };

            info!("Generating s3 credentials {} for RGW user {}", access, user.user_id);
            let request = KeyRequest {
                uid: user.user_id.clone(),
                key_type: KeyType::S3,
                access_key: access.clone(),
                generate_key: true,
            };
            let keys = guarded(cancel, "create key", self.admin.create_key(&request))
                .await?
                .map_err(|e| Error::remote("generate s3 credentials", e))?;

            match find_key(&keys, &access) {
                Some(key) => secret_key = PlanValue::Known(key.secret_key.clone()),
                None => {
                    return Err(Error::KeyGenerationMismatch {
                        access_key: access,
                        returned: keys.len(),
                    })
                }
            }
            access_key = PlanValue::Known(access);
        }

        record.access_key = access_key.into_option();
        record.secret_key = secret_key.into_option();

        let private = CredentialFlags {
            unmanaged_keys: remaining_unmanaged > 0,
            ..CredentialFlags::resolved()
        };
        Ok(Applied::new(record)
            .with_private(private)
            .with_diagnostics(diagnostics))
    }

    async fn delete(&self, prior: &UserState, cancel: &CancellationToken) -> Result<()> {
        let purge = prior.purge_data_on_delete.unwrap_or(false);
        info!("Deleting RGW user {} (purge data: {})", prior.id, purge);

        match guarded(cancel, "delete user", self.admin.remove_user(&prior.id, purge)).await? {
            Ok(()) => Ok(()),
            Err(e) if e.is_no_such_user() => {
                debug!("RGW user {} already gone", prior.id);
                Ok(())
            }
            Err(e) => Err(Error::remote("delete user", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::memory::InMemoryRgw;
    use crate::domain::ports::{RemoteError, UserCap, UserKey};
    use crate::reconcile::plan_user;
    use crate::resource::UserConfig;
    use std::sync::Arc;

    fn config(username: &str) -> UserConfig {
        UserConfig {
            username: username.into(),
            display_name: "Alice".into(),
            email: None,
            generate_s3_credentials: None,
            exclusive_s3_credentials: None,
            caps: vec![],
            op_mask: None,
            max_buckets: None,
            suspended: None,
            tenant: None,
            purge_data_on_delete: None,
        }
    }

    fn setup() -> (Arc<InMemoryRgw>, UserReconciler) {
        let rgw = Arc::new(InMemoryRgw::new());
        let reconciler = UserReconciler::new(rgw.clone());
        (rgw, reconciler)
    }

    async fn create(reconciler: &UserReconciler, config: &UserConfig) -> UserState {
        let plan = plan_user(config, None, None);
        reconciler
            .create(&plan, &CancellationToken::new())
            .await
            .unwrap()
            .record
    }

    #[tokio::test]
    async fn test_create_with_generated_credentials() {
        let (rgw, reconciler) = setup();
        let plan = plan_user(&config("alice"), None, None);

        let applied = reconciler.create(&plan, &CancellationToken::new()).await.unwrap();
        let record = applied.record;

        assert_eq!(record.id, "alice");
        assert_eq!(record.op_mask, "read, write, delete");
        assert_eq!(record.max_buckets, 1000);
        assert!(!record.suspended);
        assert_eq!(applied.private, Some(CredentialFlags::resolved()));

        let remote = rgw.user("alice").unwrap();
        assert_eq!(remote.keys.len(), 1);
        assert_eq!(record.access_key.as_deref(), Some(remote.keys[0].access_key.as_str()));
        assert_eq!(record.secret_key.as_deref(), Some(remote.keys[0].secret_key.as_str()));
    }

    #[tokio::test]
    async fn test_create_composes_tenant_id() {
        let (rgw, reconciler) = setup();
        let mut config = config("alice");
        config.tenant = Some("acme".into());
        config.caps = vec![UserCap {
            cap_type: "users".into(),
            perm: "read".into(),
        }];

        let record = create(&reconciler, &config).await;
        assert_eq!(record.id, "acme$alice");
        assert_eq!(rgw.user("acme$alice").unwrap().caps[0].perm, "read");
    }

    #[tokio::test]
    async fn test_create_without_generation() {
        let (rgw, reconciler) = setup();
        let mut config = config("bob");
        config.generate_s3_credentials = Some(false);

        let record = create(&reconciler, &config).await;
        assert_eq!(record.access_key, None);
        assert_eq!(record.secret_key, None);
        assert!(rgw.user("bob").unwrap().keys.is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_is_fatal() {
        let (rgw, reconciler) = setup();
        rgw.inject_failure(
            "create_user",
            RemoteError::Api {
                status: 409,
                code: "UserAlreadyExists".into(),
                message: "exists".into(),
            },
        );

        let plan = plan_user(&config("alice"), None, None);
        let err = reconciler.create(&plan, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::CreateFailed { .. }));
    }

    #[tokio::test]
    async fn test_read_recovers_secret_and_refreshes() {
        let (rgw, reconciler) = setup();
        let record = create(&reconciler, &config("alice")).await;
        rgw.update_user("alice", |u| u.max_buckets = Some(500));

        let applied = reconciler
            .read(&record, &CancellationToken::new())
            .await
            .unwrap()
            .into_applied()
            .unwrap();

        assert_eq!(applied.record.max_buckets, 500);
        assert_eq!(applied.record.secret_key, record.secret_key);
        assert_eq!(applied.private, Some(CredentialFlags::resolved()));
        assert!(applied.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_read_flags_missing_managed_key() {
        let (rgw, reconciler) = setup();
        let record = create(&reconciler, &config("alice")).await;
        let access_key = record.access_key.clone().unwrap();
        rgw.update_user("alice", |u| {
            u.keys = vec![UserKey {
                user: "alice".into(),
                access_key: "OTHERKEY".into(),
                secret_key: "OTHERSECRET".into(),
            }]
        });

        let applied = reconciler
            .read(&record, &CancellationToken::new())
            .await
            .unwrap()
            .into_applied()
            .unwrap();

        let flags = applied.private.unwrap();
        assert!(!flags.access_key_unresolved);
        assert!(flags.secret_key_unresolved);
        assert!(flags.unmanaged_keys);
        assert_eq!(applied.record.access_key.as_deref(), Some(access_key.as_str()));
        assert_eq!(applied.diagnostics.len(), 1);
    }

    #[tokio::test]
    async fn test_read_missing_user_is_removed() {
        let (_rgw, reconciler) = setup();
        let mut record = create(&reconciler, &config("alice")).await;
        record.id = "ghost".into();

        let outcome = reconciler.read(&record, &CancellationToken::new()).await.unwrap();
        assert!(outcome.is_removed());
    }

    #[tokio::test]
    async fn test_read_permission_denied_is_an_error() {
        let (rgw, reconciler) = setup();
        let record = create(&reconciler, &config("alice")).await;
        rgw.inject_failure(
            "get_user",
            RemoteError::AccessDenied {
                message: "denied".into(),
            },
        );

        let err = reconciler.read(&record, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn test_update_regenerates_lost_key() {
        let (rgw, reconciler) = setup();
        let record = create(&reconciler, &config("alice")).await;
        let access_key = record.access_key.clone().unwrap();
        rgw.update_user("alice", |u| u.keys.clear());

        let flags = CredentialFlags {
            secret_key_unresolved: true,
            ..Default::default()
        };
        let plan = plan_user(&config("alice"), Some(&record), Some(flags));
        let applied = reconciler
            .update(&plan, &record, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(applied.record.access_key.as_deref(), Some(access_key.as_str()));
        let remote = rgw.user("alice").unwrap();
        assert_eq!(remote.keys.len(), 1);
        assert_eq!(applied.record.secret_key.as_deref(), Some(remote.keys[0].secret_key.as_str()));
        assert_eq!(applied.private, Some(CredentialFlags::resolved()));
    }

    #[tokio::test]
    async fn test_update_with_generation_disabled_makes_no_key_calls() {
        let (rgw, reconciler) = setup();
        let record = create(&reconciler, &config("alice")).await;

        let mut config = config("alice");
        config.generate_s3_credentials = Some(false);
        let plan = plan_user(&config, Some(&record), None);
        let applied = reconciler
            .update(&plan, &record, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(applied.record.access_key, None);
        assert_eq!(applied.record.secret_key, None);
        assert_eq!(rgw.count_calls("create_key"), 0);
        assert_eq!(rgw.count_calls("remove_key"), 0);
    }

    #[tokio::test]
    async fn test_update_keeps_unmanaged_keys_when_not_exclusive() {
        let (rgw, reconciler) = setup();
        let mut config = config("alice");
        config.exclusive_s3_credentials = Some(false);
        let record = create(&reconciler, &config).await;
        rgw.add_key("alice", "FOREIGN", "FOREIGNSECRET");

        let flags = CredentialFlags {
            secret_key_unresolved: true,
            unmanaged_keys: true,
            ..Default::default()
        };
        let plan = plan_user(&config, Some(&record), Some(flags));
        let applied = reconciler
            .update(&plan, &record, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(rgw.user("alice").unwrap().keys.len(), 2);
        assert_eq!(applied.record.secret_key, record.secret_key);
        assert!(applied.private.unwrap().unmanaged_keys);
        assert_eq!(rgw.count_calls("create_key"), 0);
    }

    #[tokio::test]
    async fn test_failed_key_removal_is_not_fatal() {
        let (rgw, reconciler) = setup();
        let record = create(&reconciler, &config("alice")).await;
        rgw.add_key("alice", "FOREIGN", "FOREIGNSECRET");
        rgw.inject_failure(
            "remove_key",
            RemoteError::Api {
                status: 500,
                code: "InternalError".into(),
                message: "boom".into(),
            },
        );

        let flags = CredentialFlags {
            unmanaged_keys: true,
            ..Default::default()
        };
        let plan = plan_user(&config("alice"), Some(&record), Some(flags));
        let applied = reconciler
            .update(&plan, &record, &CancellationToken::new())
            .await
            .unwrap();

        assert!(applied.diagnostics.has_errors());
        assert!(applied.private.unwrap().unmanaged_keys);
        assert_eq!(applied.record.secret_key, record.secret_key);
    }

    #[tokio::test]
    async fn test_cancelled_update_returns_no_record() {
        let (_rgw, reconciler) = setup();
        let record = create(&reconciler, &config("alice")).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let plan = plan_user(&config("alice"), Some(&record), None);
        let err = reconciler.update(&plan, &record, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_user() {
        let (rgw, reconciler) = setup();
        let record = create(&reconciler, &config("alice")).await;

        reconciler.delete(&record, &CancellationToken::new()).await.unwrap();
        assert!(rgw.user("alice").is_none());

        reconciler.delete(&record, &CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_surfaces_other_errors() {
        let (rgw, reconciler) = setup();
        let record = create(&reconciler, &config("alice")).await;
        rgw.inject_failure(
            "remove_user",
            RemoteError::AccessDenied {
                message: "denied".into(),
            },
        );

        let err = reconciler.delete(&record, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));
        assert!(rgw.user("alice").is_some());
    }
}
