//! Bucket and bucket policy reconcilers
//!
//! Both entities live on the S3 data API. A bucket is identified by its name
//! and has nothing to update; a policy is identified by its bucket and is
//! replaced wholesale on update.

use crate::domain::ports::{ObjectStorageApiRef, RemoteError, RemoteResult};
use crate::error::{Error, Result};
use crate::reconcile::{guarded, Applied, ReadOutcome, Reconciler};
use crate::resource::{BucketConfig, BucketPolicyConfig, BucketPolicyState, BucketState, ResourceKind};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// =============================================================================
// Bucket
// =============================================================================

/// Reconciler for buckets
pub struct BucketReconciler {
    s3: ObjectStorageApiRef,
}

impl BucketReconciler {
    pub fn new(s3: ObjectStorageApiRef) -> Self {
        Self { s3 }
    }
}

#[async_trait]
impl Reconciler for BucketReconciler {
    type Plan = BucketConfig;
    type State = BucketState;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Bucket
    }

    async fn create(&self, plan: &BucketConfig, cancel: &CancellationToken) -> Result<Applied<BucketState>> {
        info!("Creating bucket {}", plan.name);
        guarded(cancel, "create bucket", self.s3.create_bucket(&plan.name))
            .await?
            .map_err(|e| Error::CreateFailed {
                kind: ResourceKind::Bucket.to_string(),
                name: plan.name.clone(),
                message: e.to_string(),
            })?;

        Ok(Applied::new(BucketState {
            id: plan.name.clone(),
            name: plan.name.clone(),
        }))
    }

    async fn read(&self, prior: &BucketState, cancel: &CancellationToken) -> Result<ReadOutcome<BucketState>> {
        match guarded(cancel, "head bucket", self.s3.head_bucket(&prior.id)).await? {
            Ok(()) => Ok(ReadOutcome::Present(Applied::new(BucketState {
                id: prior.id.clone(),
                name: prior.id.clone(),
            }))),
            Err(e) if e.is_not_found() => {
                warn!("Bucket {} no longer exists", prior.id);
                Ok(ReadOutcome::Removed)
            }
            Err(RemoteError::AccessDenied { message }) => Err(Error::PermissionDenied {
                operation: "head bucket".into(),
                message: format!(
                    "no permission to read bucket '{}', check the credentials in use: {}",
                    prior.id, message
                ),
            }),
            Err(e) => Err(Error::remote("head bucket", e)),
        }
    }

    async fn update(
        &self,
        plan: &BucketConfig,
        prior: &BucketState,
        _cancel: &CancellationToken,
    ) -> Result<Applied<BucketState>> {
        debug!("Bucket {} has no mutable attributes", prior.id);
        Ok(Applied::new(BucketState {
            id: prior.id.clone(),
            name: plan.name.clone(),
        }))
    }

    async fn delete(&self, prior: &BucketState, cancel: &CancellationToken) -> Result<()> {
        info!("Deleting bucket {}", prior.id);
        match guarded(cancel, "delete bucket", self.s3.delete_bucket(&prior.id)).await? {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("Bucket {} already gone", prior.id);
                Ok(())
            }
            Err(e) => Err(Error::remote("delete bucket", e)),
        }
    }
}

// =============================================================================
// Bucket Policy
// =============================================================================

/// Reconciler for bucket policies
pub struct BucketPolicyReconciler {
    s3: ObjectStorageApiRef,
}

impl BucketPolicyReconciler {
    pub fn new(s3: ObjectStorageApiRef) -> Self {
        Self { s3 }
    }

    async fn put(&self, plan: &BucketPolicyConfig, cancel: &CancellationToken) -> Result<RemoteResult<()>> {
        guarded(
            cancel,
            "put bucket policy",
            self.s3.put_bucket_policy(&plan.bucket, &plan.policy),
        )
        .await
    }
}

#[async_trait]
impl Reconciler for BucketPolicyReconciler {
    type Plan = BucketPolicyConfig;
    type State = BucketPolicyState;

    fn kind(&self) -> ResourceKind {
        ResourceKind::BucketPolicy
    }

    async fn create(
        &self,
        plan: &BucketPolicyConfig,
        cancel: &CancellationToken,
    ) -> Result<Applied<BucketPolicyState>> {
        info!("Attaching policy to bucket {}", plan.bucket);
        self.put(plan, cancel).await?.map_err(|e| Error::CreateFailed {
            kind: ResourceKind::BucketPolicy.to_string(),
            name: plan.bucket.clone(),
            message: e.to_string(),
        })?;

        Ok(Applied::new(BucketPolicyState {
            id: plan.bucket.clone(),
            bucket: plan.bucket.clone(),
            policy: plan.policy.clone(),
        }))
    }

    async fn read(
        &self,
        prior: &BucketPolicyState,
        cancel: &CancellationToken,
    ) -> Result<ReadOutcome<BucketPolicyState>> {
        let policy = match guarded(cancel, "get bucket policy", self.s3.get_bucket_policy(&prior.bucket)).await? {
            Ok(policy) => policy,
            Err(e) if e.is_not_found() => {
                warn!("Policy of bucket {} no longer exists", prior.bucket);
                return Ok(ReadOutcome::Removed);
            }
            Err(RemoteError::AccessDenied { message }) => {
                return Err(Error::PermissionDenied {
                    operation: "get bucket policy".into(),
                    message: format!(
                        "the credentials in use may not read the policy of bucket '{}'; \
                         policies can only be read by the bucket owner: {}",
                        prior.bucket, message
                    ),
                })
            }
            Err(RemoteError::MethodNotAllowed { message }) => {
                return Err(Error::WrongIdentity {
                    operation: "get bucket policy".into(),
                    message: format!(
                        "the credentials in use do not belong to the owner of bucket '{}': {}",
                        prior.bucket, message
                    ),
                })
            }
            Err(e) => return Err(Error::remote("get bucket policy", e)),
        };

        Ok(ReadOutcome::Present(Applied::new(BucketPolicyState {
            id: prior.bucket.clone(),
            bucket: prior.bucket.clone(),
            policy,
        })))
    }

    async fn update(
        &self,
        plan: &BucketPolicyConfig,
        prior: &BucketPolicyState,
        cancel: &CancellationToken,
    ) -> Result<Applied<BucketPolicyState>> {
        info!("Replacing policy of bucket {}", prior.bucket);
        self.put(plan, cancel)
            .await?
            .map_err(|e| Error::remote("modify bucket policy", e))?;

        Ok(Applied::new(BucketPolicyState {
            id: prior.id.clone(),
            bucket: plan.bucket.clone(),
            policy: plan.policy.clone(),
        }))
    }

    async fn delete(&self, prior: &BucketPolicyState, cancel: &CancellationToken) -> Result<()> {
        info!("Removing policy of bucket {}", prior.bucket);
        match guarded(cancel, "delete bucket policy", self.s3.delete_bucket_policy(&prior.bucket)).await? {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(Error::remote("delete bucket policy", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::memory::InMemoryRgw;
    use std::sync::Arc;

    const POLICY: &str = r#"{"Version":"2012-10-17","Statement":[]}"#;

    fn policy(bucket: &str) -> BucketPolicyConfig {
        BucketPolicyConfig {
            bucket: bucket.into(),
            policy: POLICY.into(),
        }
    }

    #[tokio::test]
    async fn test_bucket_lifecycle() {
        let rgw = Arc::new(InMemoryRgw::new());
        let reconciler = BucketReconciler::new(rgw.clone());
        let cancel = CancellationToken::new();

        let record = reconciler
            .create(&BucketConfig { name: "data".into() }, &cancel)
            .await
            .unwrap()
            .record;
        assert_eq!(record.id, "data");
        assert!(rgw.has_bucket("data"));

        let outcome = reconciler.read(&record, &cancel).await.unwrap();
        assert!(!outcome.is_removed());

        reconciler.delete(&record, &cancel).await.unwrap();
        assert!(!rgw.has_bucket("data"));
        assert!(reconciler.read(&record, &cancel).await.unwrap().is_removed());
        reconciler.delete(&record, &cancel).await.unwrap();
    }

    #[tokio::test]
    async fn test_bucket_read_denied() {
        let rgw = Arc::new(InMemoryRgw::new());
        let reconciler = BucketReconciler::new(rgw.clone());
        let cancel = CancellationToken::new();
        let record = reconciler
            .create(&BucketConfig { name: "data".into() }, &cancel)
            .await
            .unwrap()
            .record;

        rgw.inject_failure(
            "head_bucket",
            RemoteError::AccessDenied {
                message: "denied".into(),
            },
        );
        let err = reconciler.read(&record, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn test_policy_lifecycle() {
        let rgw = Arc::new(InMemoryRgw::new());
        let buckets = BucketReconciler::new(rgw.clone());
        let policies = BucketPolicyReconciler::new(rgw.clone());
        let cancel = CancellationToken::new();

        buckets
            .create(&BucketConfig { name: "data".into() }, &cancel)
            .await
            .unwrap();
        let record = policies.create(&policy("data"), &cancel).await.unwrap().record;
        assert_eq!(rgw.bucket_policy("data").as_deref(), Some(POLICY));

        let read = policies
            .read(&record, &cancel)
            .await
            .unwrap()
            .into_applied()
            .unwrap();
        assert_eq!(read.record, record);

        let mut changed = policy("data");
        changed.policy = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Deny"}]}"#.into();
        let updated = policies.update(&changed, &record, &cancel).await.unwrap().record;
        assert_eq!(rgw.bucket_policy("data").as_deref(), Some(updated.policy.as_str()));

        policies.delete(&updated, &cancel).await.unwrap();
        assert!(policies.read(&updated, &cancel).await.unwrap().is_removed());
    }

    #[tokio::test]
    async fn test_policy_read_wrong_owner() {
        let rgw = Arc::new(InMemoryRgw::new());
        let policies = BucketPolicyReconciler::new(rgw.clone());
        let record = BucketPolicyState {
            id: "data".into(),
            bucket: "data".into(),
            policy: POLICY.into(),
        };

        rgw.inject_failure(
            "get_bucket_policy",
            RemoteError::MethodNotAllowed {
                message: "not owner".into(),
            },
        );
        let err = policies.read(&record, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::WrongIdentity { .. }));
    }

    #[tokio::test]
    async fn test_policy_create_on_missing_bucket_fails() {
        let rgw = Arc::new(InMemoryRgw::new());
        let policies = BucketPolicyReconciler::new(rgw);

        let err = policies
            .create(&policy("missing"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CreateFailed { .. }));
    }
}
