//! Local state file
//!
//! JSON document holding the observed record of every managed resource plus
//! the hidden credential flags, keyed by resource address. Every save bumps
//! the serial and replaces the file atomically.

use crate::error::{Error, Result};
use crate::reconcile::{CredentialFlags, HiddenStateStore};
use crate::resource::{BucketPolicyState, BucketState, ResourceAddress, ResourceKind, UserState};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Format version written by this build
pub const STATE_VERSION: u32 = 1;

/// Observed record of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum ResourceState {
    Bucket(BucketState),
    User(UserState),
    BucketPolicy(BucketPolicyState),
}

impl ResourceState {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceState::Bucket(_) => ResourceKind::Bucket,
            ResourceState::User(_) => ResourceKind::User,
            ResourceState::BucketPolicy(_) => ResourceKind::BucketPolicy,
        }
    }
}

/// Persisted reconciliation state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    /// Incremented on every save
    pub serial: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resources: IndexMap<String, ResourceState>,
    /// Hidden credential flags, never shown in plans
    #[serde(default)]
    pub private: HiddenStateStore,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            serial: 0,
            updated_at: None,
            resources: IndexMap::new(),
            private: HiddenStateStore::new(),
        }
    }
}

impl StateFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a state file; a missing file is an empty state
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No state file at {}, starting empty", path.display());
            return Ok(Self::new());
        }

        let raw = std::fs::read_to_string(path)?;
        let state: StateFile = serde_json::from_str(&raw)?;
        if state.version > STATE_VERSION {
            return Err(Error::StateFile(format!(
                "{} was written by a newer version (format {}, supported {})",
                path.display(),
                state.version,
                STATE_VERSION
            )));
        }

        for key in state.resources.keys() {
            if ResourceAddress::parse(key).is_none() {
                warn!("Ignoring unrecognized state entry {}", key);
            }
        }
        debug!(
            "Loaded state serial {} with {} resources",
            state.serial,
            state.resources.len()
        );
        Ok(state)
    }

    /// Write the state, replacing the previous file atomically
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.serial += 1;
        self.updated_at = Some(Utc::now());

        let body = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, path).map_err(|e| {
            Error::StateFile(format!("could not replace {}: {}", path.display(), e))
        })?;

        debug!("Saved state serial {} to {}", self.serial, path.display());
        Ok(())
    }

    pub fn get(&self, address: &ResourceAddress) -> Option<&ResourceState> {
        self.resources.get(&address.to_string())
    }

    pub fn user(&self, name: &str) -> Option<&UserState> {
        match self.get(&ResourceAddress::new(ResourceKind::User, name)) {
            Some(ResourceState::User(user)) => Some(user),
            _ => None,
        }
    }

    pub fn bucket(&self, name: &str) -> Option<&BucketState> {
        match self.get(&ResourceAddress::new(ResourceKind::Bucket, name)) {
            Some(ResourceState::Bucket(bucket)) => Some(bucket),
            _ => None,
        }
    }

    pub fn bucket_policy(&self, name: &str) -> Option<&BucketPolicyState> {
        match self.get(&ResourceAddress::new(ResourceKind::BucketPolicy, name)) {
            Some(ResourceState::BucketPolicy(policy)) => Some(policy),
            _ => None,
        }
    }

    /// Hidden flags of a resource
    pub fn private(&self, address: &ResourceAddress) -> Option<CredentialFlags> {
        self.private.get(&address.to_string())
    }

    /// Store a record and, if given, its hidden flags
    pub fn put(&mut self, address: &ResourceAddress, record: ResourceState, private: Option<CredentialFlags>) {
        let key = address.to_string();
        if let Some(flags) = private {
            self.private.set(&key, flags);
        }
        self.resources.insert(key, record);
    }

    /// Drop a record together with its hidden flags
    pub fn remove(&mut self, address: &ResourceAddress) -> Option<ResourceState> {
        let key = address.to_string();
        self.private.clear(&key);
        self.resources.shift_remove(&key)
    }

    /// Recorded addresses grouped by kind in apply order, or reversed
    pub fn addresses(&self, reverse: bool) -> Vec<ResourceAddress> {
        let parsed: Vec<ResourceAddress> = self
            .resources
            .keys()
            .filter_map(|k| ResourceAddress::parse(k))
            .collect();

        let mut out = Vec::with_capacity(parsed.len());
        for kind in ResourceKind::APPLY_ORDER {
            out.extend(parsed.iter().filter(|a| a.kind == kind).cloned());
        }
        if reverse {
            out.reverse();
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }
}
