//! Domain layer - Remote API ports
//!
//! This module defines the core traits (ports) that the RGW adapters
//! implement, following hexagonal architecture principles.

pub mod ports;

pub use ports::*;
