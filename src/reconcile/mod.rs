//! Reconcile Engine
//!
//! Per-entity Create/Read/Update/Delete operations that bring the remote RGW
//! state towards the declared state, plus the planner and the pure helpers
//! they build on.
//!
//! Every operation works on its inputs by value and only hands a record back
//! once all of its remote calls have finished, so a cancelled or failed
//! operation never leaves a half-applied record behind.

pub mod bucket;
pub mod credentials;
pub mod defaults;
pub mod diagnostics;
pub mod hidden_state;
pub mod identity;
pub mod planner;
pub mod user;

pub use bucket::{BucketPolicyReconciler, BucketReconciler};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use hidden_state::{CredentialFlags, HiddenStateStore};
pub use identity::{compose_user_id, split_user_id, UserId};
pub use planner::plan_user;
pub use user::UserReconciler;

use crate::domain::ports::RemoteResult;
use crate::error::{Error, Result};
use crate::resource::ResourceKind;
use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Operation Results
// =============================================================================

/// Successful result of a create, read or update
#[derive(Debug, Clone)]
pub struct Applied<S> {
    /// Merged observed record, the new source of truth
    pub record: S,
    /// Hidden state to persist next to the record
    pub private: Option<CredentialFlags>,
    /// Non-fatal problems hit along the way
    pub diagnostics: Diagnostics,
}

impl<S> Applied<S> {
    pub fn new(record: S) -> Self {
        Self {
            record,
            private: None,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn with_private(mut self, private: CredentialFlags) -> Self {
        self.private = Some(private);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Convert the record, keeping hidden state and diagnostics
    pub fn map<T>(self, f: impl FnOnce(S) -> T) -> Applied<T> {
        Applied {
            record: f(self.record),
            private: self.private,
            diagnostics: self.diagnostics,
        }
    }
}

/// Result of a read
#[derive(Debug, Clone)]
pub enum ReadOutcome<S> {
    /// The entity exists; the record is refreshed
    Present(Applied<S>),
    /// The entity is gone remotely; the caller drops the local record
    Removed,
}

impl<S> ReadOutcome<S> {
    pub fn is_removed(&self) -> bool {
        matches!(self, ReadOutcome::Removed)
    }

    pub fn into_applied(self) -> Option<Applied<S>> {
        match self {
            ReadOutcome::Present(applied) => Some(applied),
            ReadOutcome::Removed => None,
        }
    }
}

// =============================================================================
// Lifecycle Port
// =============================================================================

/// Lifecycle contract shared by every resource kind
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Desired record after planning
    type Plan: Send + Sync;
    /// Observed record
    type State: Send + Sync;

    /// Resource kind handled by this reconciler
    fn kind(&self) -> ResourceKind;

    /// Create the entity; called at most once per identity
    async fn create(&self, plan: &Self::Plan, cancel: &CancellationToken) -> Result<Applied<Self::State>>;

    /// Refresh the entity from the remote side
    async fn read(&self, prior: &Self::State, cancel: &CancellationToken) -> Result<ReadOutcome<Self::State>>;

    /// Bring an existing entity in line with the plan
    async fn update(
        &self,
        plan: &Self::Plan,
        prior: &Self::State,
        cancel: &CancellationToken,
    ) -> Result<Applied<Self::State>>;

    /// Delete the entity; an entity that is already gone is not an error
    async fn delete(&self, prior: &Self::State, cancel: &CancellationToken) -> Result<()>;
}

/// Race a remote call against cancellation
///
/// The outer result carries cancellation, the inner one the remote outcome so
/// callers can classify not-found and permission errors themselves.
pub(crate) async fn guarded<T, F>(cancel: &CancellationToken, operation: &str, call: F) -> Result<RemoteResult<T>>
where
    F: Future<Output = RemoteResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled {
            operation: operation.to_string(),
        }),
        result = call => Ok(result),
    }
}
