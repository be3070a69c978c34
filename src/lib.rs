//! RGW Reconciler
//!
//! Reconciles declared Ceph RadosGW users, buckets and bucket policies against
//! a live cluster through the admin ops API and the S3 data API.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              Orchestrator                                    │
//! │            refresh ─► plan ─► apply (buckets ─► users ─► policies)          │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │    Manifest     │  │     Planner     │  │        State File           │  │
//! │  │    (YAML)       │  │ defaults/unknown│  │  records + hidden flags     │  │
//! │  └────────┬────────┘  └────────┬────────┘  └─────────────┬───────────────┘  │
//! │           └────────────────────┼─────────────────────────┘                   │
//! │                    ┌───────────┴───────────┐                                │
//! │                    │      Reconcilers      │                                │
//! │                    │  user / bucket / pol. │                                │
//! │                    └───────────┬───────────┘                                │
//! ├────────────────────────────────┼────────────────────────────────────────────┤
//! │                          RGW Backends                                        │
//! │  ┌─────────────────┐  ┌────────┴────────┐  ┌─────────────────────────────┐  │
//! │  │   Admin Ops     │  │     S3 API      │  │        In-Memory            │  │
//! │  │ (reqwest+SigV4) │  │  (aws-sdk-s3)   │  │   (standalone / tests)      │  │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: Orchestrator, state file and RGW backends
//! - [`reconcile`]: Per-entity lifecycle operations and the planner
//! - [`resource`]: Declared, planned and observed resource records
//! - [`domain`]: Remote API ports
//! - [`metrics`]: Prometheus metrics of a run
//! - [`error`]: Error types and handling

pub mod controlplane;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod reconcile;
pub mod resource;

// Re-export commonly used types
pub use controlplane::{
    Action, BackendConfig, BackendFactory, InMemoryRgw, Orchestrator, OrchestratorConfig, Plan,
    Report, RgwClients, RgwConfig, StateFile,
};

pub use domain::ports::{
    AdminApi, AdminApiRef, KeyRequest, KeyType, ObjectStorageApi, ObjectStorageApiRef,
    RemoteError, RemoteResult, RgwUser, UserCap, UserKey, UserRequest,
};

pub use error::{Error, Result};

pub use metrics::Metrics;

pub use reconcile::{
    plan_user, Applied, BucketPolicyReconciler, BucketReconciler, CredentialFlags, Diagnostic,
    Diagnostics, HiddenStateStore, ReadOutcome, Reconciler, Severity, UserReconciler,
};

pub use resource::{
    BucketConfig, BucketPolicyConfig, BucketPolicyState, BucketState, Manifest, PlanValue,
    ResourceAddress, ResourceKind, UserConfig, UserPlan, UserState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
