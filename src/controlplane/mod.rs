//! Control Plane Module
//!
//! Connects the reconcile engine to a RadosGW: backend adapters, the local
//! state file and the orchestrator that runs reconcile passes.

pub mod backends;
pub mod orchestrator;
pub mod state;

pub use backends::{BackendConfig, BackendFactory, InMemoryRgw, RgwClients, RgwConfig};
pub use orchestrator::{Action, Orchestrator, OrchestratorConfig, Plan, PlannedChange, Report};
pub use state::{ResourceState, StateFile, STATE_VERSION};
