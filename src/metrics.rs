//! Reconcile metrics
//!
//! Prometheus metrics for one reconciler run:
//!
//! - `rgw_reconcile_operations_total{kind, operation, outcome}`
//! - `rgw_reconcile_operation_duration_seconds{kind, operation}`
//! - `rgw_reconcile_credentials_regenerated_total`
//! - `rgw_reconcile_diagnostics_total{severity}`
//!
//! The CLI is short-lived, so metrics are written to a textfile-collector
//! file at exit rather than served.

use crate::error::{Error, Result};
use crate::reconcile::Diagnostics;
use crate::resource::ResourceKind;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::path::Path;

fn metric_error(err: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", err))
}

/// Metrics registry of a run
pub struct Metrics {
    registry: Registry,
    operations: IntCounterVec,
    duration: HistogramVec,
    credentials_regenerated: IntCounter,
    diagnostics: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let operations = IntCounterVec::new(
            Opts::new("rgw_reconcile_operations_total", "Reconcile operations by outcome"),
            &["kind", "operation", "outcome"],
        )
        .map_err(metric_error)?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "rgw_reconcile_operation_duration_seconds",
                "Duration of reconcile operations in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["kind", "operation"],
        )
        .map_err(metric_error)?;
        let credentials_regenerated = IntCounter::new(
            "rgw_reconcile_credentials_regenerated_total",
            "S3 key pairs whose secret was regenerated",
        )
        .map_err(metric_error)?;
        let diagnostics = IntCounterVec::new(
            Opts::new("rgw_reconcile_diagnostics_total", "Diagnostics reported"),
            &["severity"],
        )
        .map_err(metric_error)?;

        registry.register(Box::new(operations.clone())).map_err(metric_error)?;
        registry.register(Box::new(duration.clone())).map_err(metric_error)?;
        registry
            .register(Box::new(credentials_regenerated.clone()))
            .map_err(metric_error)?;
        registry.register(Box::new(diagnostics.clone())).map_err(metric_error)?;

        Ok(Self {
            registry,
            operations,
            duration,
            credentials_regenerated,
            diagnostics,
        })
    }

    /// Record one finished operation
    pub fn observe(&self, kind: ResourceKind, operation: &str, success: bool, seconds: f64) {
        let outcome = if success { "success" } else { "error" };
        self.operations
            .with_label_values(&[kind.as_str(), operation, outcome])
            .inc();
        self.duration
            .with_label_values(&[kind.as_str(), operation])
            .observe(seconds);
    }

    pub fn credentials_regenerated(&self) {
        self.credentials_regenerated.inc();
    }

    pub fn record_diagnostics(&self, diagnostics: &Diagnostics) {
        for diagnostic in diagnostics.iter() {
            self.diagnostics
                .with_label_values(&[&diagnostic.severity.to_string()])
                .inc();
        }
    }

    pub fn operation_count(&self, kind: ResourceKind, operation: &str, success: bool) -> u64 {
        let outcome = if success { "success" } else { "error" };
        self.operations
            .with_label_values(&[kind.as_str(), operation, outcome])
            .get()
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics: {}", e)))
    }

    /// Write the text exposition to a file for the node exporter
    pub fn write_textfile(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, self.render()?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
