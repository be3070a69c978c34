//! Main Orchestrator
//!
//! Drives one reconciliation pass over a manifest and a state file:
//! - Refresh every recorded resource from RGW
//! - Plan the create/update/replace/delete actions
//! - Apply them in kind order, saving state after every resource
//! - Destroy everything recorded
//!
//! There is no dependency graph: creates and updates run buckets, then users,
//! then policies; deletes run in the reverse order.

use crate::controlplane::backends::RgwClients;
use crate::controlplane::state::{ResourceState, StateFile};
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::reconcile::{
    plan_user, Applied, BucketPolicyReconciler, BucketReconciler, Diagnostic, Diagnostics,
    ReadOutcome, Reconciler, UserReconciler,
};
use crate::resource::{Manifest, ResourceAddress, ResourceKind};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

// =============================================================================
// Orchestrator Configuration
// =============================================================================

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Path of the state file
    pub state_path: PathBuf,
    /// Number of resources refreshed at once
    pub refresh_concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("rgw-state.json"),
            refresh_concurrency: 4,
        }
    }
}

// =============================================================================
// Plan
// =============================================================================

/// Action planned for one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Replace,
    Delete,
    NoOp,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Action::Create => "+ create",
            Action::Update => "~ update",
            Action::Replace => "-/+ replace",
            Action::Delete => "- delete",
            Action::NoOp => "  no-op",
        };
        write!(f, "{}", symbol)
    }
}

/// One planned change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedChange {
    #[serde(serialize_with = "serialize_address")]
    pub address: ResourceAddress,
    pub action: Action,
    /// Attributes that differ from the recorded state
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
}

fn serialize_address<S: serde::Serializer>(address: &ResourceAddress, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&address.to_string())
}

/// Ordered list of planned changes
#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
    pub changes: Vec<PlannedChange>,
}

impl Plan {
    pub fn count(&self, action: Action) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }

    /// True when applying would not touch RGW
    pub fn is_empty(&self) -> bool {
        self.changes.iter().all(|c| c.action == Action::NoOp)
    }

    pub fn action_for(&self, address: &ResourceAddress) -> Option<Action> {
        self.changes.iter().find(|c| &c.address == address).map(|c| c.action)
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for change in self.changes.iter().filter(|c| c.action != Action::NoOp) {
            if change.attributes.is_empty() {
                writeln!(f, "{} {}", change.action, change.address)?;
            } else {
                writeln!(f, "{} {} ({})", change.action, change.address, change.attributes.join(", "))?;
            }
        }
        write!(
            f,
            "Plan: {} to create, {} to update, {} to replace, {} to delete.",
            self.count(Action::Create),
            self.count(Action::Update),
            self.count(Action::Replace),
            self.count(Action::Delete)
        )
    }
}

// =============================================================================
// Report
// =============================================================================

/// Outcome of a refresh, apply or destroy
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub deleted: usize,
    /// Records dropped because the resource was gone remotely
    pub vanished: usize,
    pub diagnostics: Diagnostics,
}

impl Report {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }

    fn fail(&mut self, address: &ResourceAddress, err: &Error) {
        let mut diagnostic = Diagnostic::from(err);
        diagnostic.detail = format!("{}: {}", address, diagnostic.detail);
        self.diagnostics.push(diagnostic);
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} replaced, {} deleted, {} gone remotely, {} errors",
            self.created,
            self.updated,
            self.replaced,
            self.deleted,
            self.vanished,
            self.diagnostics.error_count()
        )
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Runs reconcile passes against one RGW and one state file
pub struct Orchestrator {
    config: OrchestratorConfig,
    users: UserReconciler,
    buckets: BucketReconciler,
    policies: BucketPolicyReconciler,
    state: StateFile,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator and load its state file
    pub fn new(
        config: OrchestratorConfig,
        clients: RgwClients,
        metrics: Arc<Metrics>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let state = StateFile::load(&config.state_path)?;
        Ok(Self {
            config,
            users: UserReconciler::new(clients.admin),
            buckets: BucketReconciler::new(clients.s3.clone()),
            policies: BucketPolicyReconciler::new(clients.s3),
            state,
            metrics,
            cancel,
        })
    }

    pub fn state(&self) -> &StateFile {
        &self.state
    }

    fn save(&mut self) -> Result<()> {
        self.state.save(&self.config.state_path)
    }

    /// Time an operation and count its outcome
    async fn observed<T, F>(&self, kind: ResourceKind, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = call.await;
        self.metrics
            .observe(kind, operation, result.is_ok(), started.elapsed().as_secs_f64());
        result
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    async fn read(&self, record: ResourceState) -> Result<ReadOutcome<ResourceState>> {
        let kind = record.kind();
        let outcome = match record {
            ResourceState::User(prior) => self
                .observed(kind, "read", self.users.read(&prior, &self.cancel))
                .await?
                .into_applied()
                .map(|a| a.map(ResourceState::User)),
            ResourceState::Bucket(prior) => self
                .observed(kind, "read", self.buckets.read(&prior, &self.cancel))
                .await?
                .into_applied()
                .map(|a| a.map(ResourceState::Bucket)),
            ResourceState::BucketPolicy(prior) => self
                .observed(kind, "read", self.policies.read(&prior, &self.cancel))
                .await?
                .into_applied()
                .map(|a| a.map(ResourceState::BucketPolicy)),
        };
        Ok(match outcome {
            Some(applied) => ReadOutcome::Present(applied),
            None => ReadOutcome::Removed,
        })
    }

    /// Read every recorded resource and merge the results into the state
    pub async fn refresh(&mut self) -> Result<Report> {
        let addresses = self.state.addresses(false);
        info!("Refreshing {} resources", addresses.len());

        let jobs: Vec<(ResourceAddress, ResourceState)> = addresses
            .into_iter()
            .filter_map(|a| self.state.get(&a).cloned().map(|r| (a, r)))
            .collect();

        let this = &*self;
        let results: Vec<(ResourceAddress, Result<ReadOutcome<ResourceState>>)> = stream::iter(jobs)
            .map(|(address, record)| async move { (address, this.read(record).await) })
            .buffered(this.config.refresh_concurrency.max(1))
            .collect()
            .await;

        let mut report = Report::default();
        for (address, result) in results {
            match result {
                Ok(ReadOutcome::Present(applied)) => {
                    report.diagnostics.extend(applied.diagnostics);
                    self.state.put(&address, applied.record, applied.private);
                }
                Ok(ReadOutcome::Removed) => {
                    warn!("{} is gone remotely, dropping it from state", address);
                    self.state.remove(&address);
                    report.vanished += 1;
                }
                Err(e @ Error::Cancelled { .. }) => {
                    self.save()?;
                    return Err(e);
                }
                Err(e) => {
                    error!("Refreshing {} failed: {}", address, e);
                    report.fail(&address, &e);
                }
            }
        }

        self.save()?;
        self.metrics.record_diagnostics(&report.diagnostics);
        Ok(report)
    }

    // =========================================================================
    // Plan
    // =========================================================================

    /// Compute the changes needed to reach the manifest, without remote calls
    pub fn plan(&self, manifest: &Manifest) -> Plan {
        let mut plan = Plan::default();

        for address in self.state.addresses(true) {
            let declared = match address.kind {
                ResourceKind::User => manifest.users.contains_key(&address.name),
                ResourceKind::Bucket => manifest.buckets.contains_key(&address.name),
                ResourceKind::BucketPolicy => manifest.bucket_policies.contains_key(&address.name),
            };
            if !declared {
                plan.changes.push(PlannedChange {
                    address,
                    action: Action::Delete,
                    attributes: vec![],
                });
            }
        }

        for address in manifest.addresses() {
            let (action, attributes) = self.plan_one(manifest, &address);
            plan.changes.push(PlannedChange {
                address,
                action,
                attributes,
            });
        }
        plan
    }

    fn plan_one(&self, manifest: &Manifest, address: &ResourceAddress) -> (Action, Vec<String>) {
        let name = address.name.as_str();
        match address.kind {
            ResourceKind::User => {
                let (Some(config), Some(prior)) = (manifest.users.get(name), self.state.user(name)) else {
                    return (Action::Create, vec![]);
                };
                let plan = plan_user(config, Some(prior), self.state.private(address));
                let attributes = plan
                    .changed_attributes(prior)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                if plan.requires_replace(prior) {
                    (Action::Replace, attributes)
                } else if plan.has_changes(prior) {
                    (Action::Update, attributes)
                } else {
                    (Action::NoOp, vec![])
                }
            }
            ResourceKind::Bucket => {
                let (Some(config), Some(prior)) = (manifest.buckets.get(name), self.state.bucket(name)) else {
                    return (Action::Create, vec![]);
                };
                if config.requires_replace(prior) {
                    (Action::Replace, vec!["name".to_string()])
                } else {
                    (Action::NoOp, vec![])
                }
            }
            ResourceKind::BucketPolicy => {
                let (Some(config), Some(prior)) =
                    (manifest.bucket_policies.get(name), self.state.bucket_policy(name))
                else {
                    return (Action::Create, vec![]);
                };
                if config.requires_replace(prior) {
                    (Action::Replace, vec!["bucket".to_string()])
                } else if config.has_changes(prior) {
                    (Action::Update, vec!["policy".to_string()])
                } else {
                    (Action::NoOp, vec![])
                }
            }
        }
    }

    // =========================================================================
    // Apply
    // =========================================================================

    /// Refresh, then bring RGW in line with the manifest
    pub async fn apply(&mut self, manifest: &Manifest) -> Result<Report> {
        let mut report = self.refresh().await?;
        if report.has_errors() {
            warn!("Refresh reported errors, not applying");
            return Ok(report);
        }

        let plan = self.plan(manifest);
        info!("{}", plan);

        for change in plan.changes {
            if change.action == Action::NoOp {
                continue;
            }
            match self.execute(manifest, &change.address, change.action).await {
                Ok(diagnostics) => {
                    report.diagnostics.extend(diagnostics);
                    match change.action {
                        Action::Create => report.created += 1,
                        Action::Update => report.updated += 1,
                        Action::Replace => report.replaced += 1,
                        Action::Delete => report.deleted += 1,
                        Action::NoOp => {}
                    }
                }
                Err(e @ Error::Cancelled { .. }) => return Err(e),
                Err(e) => {
                    error!("Applying {} to {} failed: {}", change.action, change.address, e);
                    report.fail(&change.address, &e);
                }
            }
        }

        self.metrics.record_diagnostics(&report.diagnostics);
        info!("Apply complete: {}", report);
        Ok(report)
    }

    async fn execute(&mut self, manifest: &Manifest, address: &ResourceAddress, action: Action) -> Result<Diagnostics> {
        match action {
            Action::Delete => {
                self.delete(address).await?;
                Ok(Diagnostics::new())
            }
            Action::Replace => {
                self.delete(address).await?;
                self.create(manifest, address).await
            }
            Action::Create => self.create(manifest, address).await,
            Action::Update => self.update(manifest, address).await,
            Action::NoOp => Ok(Diagnostics::new()),
        }
    }

    fn store(&mut self, address: &ResourceAddress, applied: Applied<ResourceState>) -> Result<Diagnostics> {
        self.state.put(address, applied.record, applied.private);
        self.save()?;
        Ok(applied.diagnostics)
    }

    fn undeclared(address: &ResourceAddress) -> Error {
        Error::Internal(format!("{} is not declared", address))
    }

    async fn create(&mut self, manifest: &Manifest, address: &ResourceAddress) -> Result<Diagnostics> {
        let name = address.name.as_str();
        let kind = address.kind;
        info!("Creating {}", address);

        let applied = match kind {
            ResourceKind::User => {
                let config = manifest.users.get(name).ok_or_else(|| Self::undeclared(address))?;
                let plan = plan_user(config, None, None);
                self.observed(kind, "create", self.users.create(&plan, &self.cancel))
                    .await?
                    .map(ResourceState::User)
            }
            ResourceKind::Bucket => {
                let config = manifest.buckets.get(name).ok_or_else(|| Self::undeclared(address))?;
                self.observed(kind, "create", self.buckets.create(config, &self.cancel))
                    .await?
                    .map(ResourceState::Bucket)
            }
            ResourceKind::BucketPolicy => {
                let config = manifest
                    .bucket_policies
                    .get(name)
                    .ok_or_else(|| Self::undeclared(address))?;
                self.observed(kind, "create", self.policies.create(config, &self.cancel))
                    .await?
                    .map(ResourceState::BucketPolicy)
            }
        };
        self.store(address, applied)
    }

    async fn update(&mut self, manifest: &Manifest, address: &ResourceAddress) -> Result<Diagnostics> {
        let name = address.name.as_str();
        let kind = address.kind;
        info!("Updating {}", address);

        let applied = match kind {
            ResourceKind::User => {
                let config = manifest.users.get(name).ok_or_else(|| Self::undeclared(address))?;
                let prior = self.state.user(name).cloned().ok_or_else(|| Error::NotFound {
                    kind: kind.to_string(),
                    name: name.to_string(),
                })?;
                let plan = plan_user(config, Some(&prior), self.state.private(address));
                let applied = self
                    .observed(kind, "update", self.users.update(&plan, &prior, &self.cancel))
                    .await?;
                if applied.record.secret_key.is_some() && applied.record.secret_key != prior.secret_key {
                    self.metrics.credentials_regenerated();
                }
                applied.map(ResourceState::User)
            }
            ResourceKind::Bucket => {
                let config = manifest.buckets.get(name).ok_or_else(|| Self::undeclared(address))?;
                let prior = self.state.bucket(name).cloned().ok_or_else(|| Error::NotFound {
                    kind: kind.to_string(),
                    name: name.to_string(),
                })?;
                self.observed(kind, "update", self.buckets.update(config, &prior, &self.cancel))
                    .await?
                    .map(ResourceState::Bucket)
            }
            ResourceKind::BucketPolicy => {
                let config = manifest
                    .bucket_policies
                    .get(name)
                    .ok_or_else(|| Self::undeclared(address))?;
                let prior = self.state.bucket_policy(name).cloned().ok_or_else(|| Error::NotFound {
                    kind: kind.to_string(),
                    name: name.to_string(),
                })?;
                self.observed(kind, "update", self.policies.update(config, &prior, &self.cancel))
                    .await?
                    .map(ResourceState::BucketPolicy)
            }
        };
        self.store(address, applied)
    }

    async fn delete(&mut self, address: &ResourceAddress) -> Result<()> {
        let Some(record) = self.state.get(address).cloned() else {
            return Ok(());
        };
        info!("Deleting {}", address);

        let kind = record.kind();
        match &record {
            ResourceState::User(prior) => {
                self.observed(kind, "delete", self.users.delete(prior, &self.cancel))
                    .await?
            }
            ResourceState::Bucket(prior) => {
                self.observed(kind, "delete", self.buckets.delete(prior, &self.cancel))
                    .await?
            }
            ResourceState::BucketPolicy(prior) => {
                self.observed(kind, "delete", self.policies.delete(prior, &self.cancel))
                    .await?
            }
        }

        self.state.remove(address);
        self.save()
    }

    // =========================================================================
    // Destroy
    // =========================================================================

    /// Delete every recorded resource, policies first
    pub async fn destroy(&mut self) -> Result<Report> {
        let mut report = Report::default();
        for address in self.state.addresses(true) {
            match self.delete(&address).await {
                Ok(()) => report.deleted += 1,
                Err(e @ Error::Cancelled { .. }) => return Err(e),
                Err(e) => {
                    error!("Deleting {} failed: {}", address, e);
                    report.fail(&address, &e);
                }
            }
        }

        self.metrics.record_diagnostics(&report.diagnostics);
        info!("Destroy complete: {}", report);
        Ok(report)
    }
}
