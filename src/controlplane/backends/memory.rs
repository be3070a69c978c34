//! In-memory RGW
//!
//! Simulates both the admin ops API and the S3 data API of a RadosGW in
//! process. Used by `--standalone` runs and by the test suites, which also
//! inspect its call journal and inject one-shot failures.

use crate::domain::ports::{
    AdminApi, KeyRequest, ObjectStorageApi, RemoteError, RemoteResult, RgwUser, UserKey, UserRequest,
};
use crate::reconcile::credentials::generate_access_key;
use async_trait::async_trait;
use parking_lot::RwLock;
use rand::distributions::{Alphanumeric, DistString};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Length of generated secret keys
const SECRET_KEY_LENGTH: usize = 40;

/// One recorded API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: &'static str,
    pub target: String,
}

#[derive(Debug, Clone, Default)]
struct Bucket {
    policy: Option<String>,
}

/// In-process stand-in for a RadosGW
#[derive(Debug, Default)]
pub struct InMemoryRgw {
    users: RwLock<BTreeMap<String, RgwUser>>,
    buckets: RwLock<BTreeMap<String, Bucket>>,
    calls: RwLock<Vec<Call>>,
    failures: RwLock<HashMap<&'static str, RemoteError>>,
}

impl InMemoryRgw {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Inspection & Fault Injection
    // =========================================================================

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.calls.read().clone()
    }

    /// Number of calls received for one operation
    pub fn count_calls(&self, operation: &str) -> usize {
        self.calls.read().iter().filter(|c| c.operation == operation).count()
    }

    /// Fail the next call of `operation` with `error`
    pub fn inject_failure(&self, operation: &'static str, error: RemoteError) {
        self.failures.write().insert(operation, error);
    }

    /// Snapshot of a user
    pub fn user(&self, uid: &str) -> Option<RgwUser> {
        self.users.read().get(uid).cloned()
    }

    /// Mutate a stored user out of band
    pub fn update_user(&self, uid: &str, f: impl FnOnce(&mut RgwUser)) {
        if let Some(user) = self.users.write().get_mut(uid) {
            f(user);
        }
    }

    /// Attach an extra key pair to a user out of band
    pub fn add_key(&self, uid: &str, access_key: &str, secret_key: &str) {
        self.update_user(uid, |user| {
            user.keys.push(UserKey {
                user: uid.to_string(),
                access_key: access_key.to_string(),
                secret_key: secret_key.to_string(),
            })
        });
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.read().contains_key(bucket)
    }

    pub fn bucket_policy(&self, bucket: &str) -> Option<String> {
        self.buckets.read().get(bucket).and_then(|b| b.policy.clone())
    }

    fn record(&self, operation: &'static str, target: &str) -> RemoteResult<()> {
        debug!("in-memory rgw: {} {}", operation, target);
        self.calls.write().push(Call {
            operation,
            target: target.to_string(),
        });
        match self.failures.write().remove(operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn generate_secret() -> String {
        Alphanumeric.sample_string(&mut rand::thread_rng(), SECRET_KEY_LENGTH)
    }

    fn key_owner(&self, access_key: &str) -> Option<String> {
        self.users
            .read()
            .values()
            .find(|u| u.keys.iter().any(|k| k.access_key == access_key))
            .map(|u| u.user_id.clone())
    }

    fn no_such_user(uid: &str) -> RemoteError {
        RemoteError::NoSuchUser {
            message: format!("user '{}' does not exist", uid),
        }
    }

    fn no_such_bucket(bucket: &str) -> RemoteError {
        RemoteError::NotFound {
            code: "NoSuchBucket".into(),
            message: format!("bucket '{}' does not exist", bucket),
        }
    }

    fn apply_request(user: &mut RgwUser, request: &UserRequest) {
        user.display_name = request.display_name.clone();
        user.email = request.email.clone();
        user.op_mask = Some(request.op_mask.clone());
        user.caps = request.caps.clone();
        if let Some(max_buckets) = request.max_buckets {
            user.max_buckets = Some(max_buckets);
        }
        if let Some(suspended) = request.suspended {
            user.suspended = Some(i64::from(suspended));
        }
    }
}

// =============================================================================
// Admin API
// =============================================================================

#[async_trait]
impl AdminApi for InMemoryRgw {
    async fn create_user(&self, request: &UserRequest) -> RemoteResult<RgwUser> {
        self.record("create_user", &request.uid)?;

        let mut users = self.users.write();
        if users.contains_key(&request.uid) {
            return Err(RemoteError::Api {
                status: 409,
                code: "UserAlreadyExists".into(),
                message: format!("user '{}' already exists", request.uid),
            });
        }

        let mut user = RgwUser {
            user_id: request.uid.clone(),
            max_buckets: Some(1000),
            suspended: Some(0),
            ..Default::default()
        };
        Self::apply_request(&mut user, request);
        if request.generate_key {
            user.keys.push(UserKey {
                user: request.uid.clone(),
                access_key: generate_access_key(),
                secret_key: Self::generate_secret(),
            });
        }

        users.insert(request.uid.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, uid: &str) -> RemoteResult<RgwUser> {
        self.record("get_user", uid)?;
        self.user(uid).ok_or_else(|| Self::no_such_user(uid))
    }

    async fn modify_user(&self, request: &UserRequest) -> RemoteResult<RgwUser> {
        self.record("modify_user", &request.uid)?;

        let mut users = self.users.write();
        let user = users
            .get_mut(&request.uid)
            .ok_or_else(|| Self::no_such_user(&request.uid))?;
        Self::apply_request(user, request);
        Ok(user.clone())
    }

    async fn remove_user(&self, uid: &str, _purge_data: bool) -> RemoteResult<()> {
        self.record("remove_user", uid)?;
        match self.users.write().remove(uid) {
            Some(_) => Ok(()),
            None => Err(Self::no_such_user(uid)),
        }
    }

    async fn create_key(&self, request: &KeyRequest) -> RemoteResult<Vec<UserKey>> {
        self.record("create_key", &request.uid)?;

        if let Some(owner) = self.key_owner(&request.access_key) {
            if owner != request.uid {
                return Err(RemoteError::Api {
                    status: 409,
                    code: "KeyExists".into(),
                    message: format!("access key '{}' belongs to another user", request.access_key),
                });
            }
        }

        let mut users = self.users.write();
        let user = users
            .get_mut(&request.uid)
            .ok_or_else(|| Self::no_such_user(&request.uid))?;

        let secret = Self::generate_secret();
        match user.keys.iter_mut().find(|k| k.access_key == request.access_key) {
            Some(key) => key.secret_key = secret,
            None => user.keys.push(UserKey {
                user: request.uid.clone(),
                access_key: request.access_key.clone(),
                secret_key: secret,
            }),
        }
        Ok(user.keys.clone())
    }

    async fn remove_key(&self, uid: &str, access_key: &str) -> RemoteResult<()> {
        self.record("remove_key", access_key)?;

        let mut users = self.users.write();
        let user = users.get_mut(uid).ok_or_else(|| Self::no_such_user(uid))?;
        let before = user.keys.len();
        user.keys.retain(|k| k.access_key != access_key);
        if user.keys.len() == before {
            return Err(RemoteError::NotFound {
                code: "NoSuchKey".into(),
                message: format!("access key '{}' does not exist", access_key),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Object Storage API
// =============================================================================

#[async_trait]
impl ObjectStorageApi for InMemoryRgw {
    async fn create_bucket(&self, bucket: &str) -> RemoteResult<()> {
        self.record("create_bucket", bucket)?;

        let mut buckets = self.buckets.write();
        if buckets.contains_key(bucket) {
            return Err(RemoteError::Api {
                status: 409,
                code: "BucketAlreadyExists".into(),
                message: format!("bucket '{}' already exists", bucket),
            });
        }
        buckets.insert(bucket.to_string(), Bucket::default());
        Ok(())
    }

    async fn head_bucket(&self, bucket: &str) -> RemoteResult<()> {
        self.record("head_bucket", bucket)?;
        if self.has_bucket(bucket) {
            Ok(())
        } else {
            Err(Self::no_such_bucket(bucket))
        }
    }

    async fn delete_bucket(&self, bucket: &str) -> RemoteResult<()> {
        self.record("delete_bucket", bucket)?;
        match self.buckets.write().remove(bucket) {
            Some(_) => Ok(()),
            None => Err(Self::no_such_bucket(bucket)),
        }
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> RemoteResult<()> {
        self.record("put_bucket_policy", bucket)?;
        let mut buckets = self.buckets.write();
        let entry = buckets.get_mut(bucket).ok_or_else(|| Self::no_such_bucket(bucket))?;
        entry.policy = Some(policy.to_string());
        Ok(())
    }

    async fn get_bucket_policy(&self, bucket: &str) -> RemoteResult<String> {
        self.record("get_bucket_policy", bucket)?;
        let buckets = self.buckets.read();
        let entry = buckets.get(bucket).ok_or_else(|| Self::no_such_bucket(bucket))?;
        entry.policy.clone().ok_or_else(|| RemoteError::NotFound {
            code: "NoSuchBucketPolicy".into(),
            message: format!("bucket '{}' has no policy", bucket),
        })
    }

    async fn delete_bucket_policy(&self, bucket: &str) -> RemoteResult<()> {
        self.record("delete_bucket_policy", bucket)?;
        let mut buckets = self.buckets.write();
        let entry = buckets.get_mut(bucket).ok_or_else(|| Self::no_such_bucket(bucket))?;
        entry.policy = None;
        Ok(())
    }
}
