//! RGW Reconciler
//!
//! Command line front end: loads a manifest and a state file and runs one
//! reconcile pass against a Ceph RadosGW.
//!
//! ```text
//!   rgw-reconciler plan    -m rgw.yaml     show what apply would change
//!   rgw-reconciler apply   -m rgw.yaml     refresh, then create/update/delete
//!   rgw-reconciler refresh                 re-read every recorded resource
//!   rgw-reconciler destroy                 delete every recorded resource
//!   rgw-reconciler schema                  print the manifest JSON schema
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rgw_reconciler::{
    BackendConfig, BackendFactory, Diagnostics, Error, Manifest, Metrics, Orchestrator,
    OrchestratorConfig, Report, RgwConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// RGW Reconciler - declarative users, buckets and bucket policies for Ceph RadosGW
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// RadosGW endpoint
    #[arg(long, env = "RGW_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Administrative access key
    #[arg(long, env = "RGW_ACCESS_KEY", global = true, hide_env_values = true)]
    access_key: Option<String>,

    /// Administrative secret key
    #[arg(long, env = "RGW_SECRET_KEY", global = true, hide_env_values = true)]
    secret_key: Option<String>,

    /// Signing region
    #[arg(long, env = "RGW_REGION", default_value = "us-east-1", global = true)]
    region: String,

    /// Request timeout in seconds
    #[arg(long, env = "RGW_TIMEOUT", default_value = "30", global = true)]
    timeout_secs: u64,

    /// Skip TLS certificate verification
    #[arg(long, env = "RGW_INSECURE", global = true)]
    insecure: bool,

    /// State file path
    #[arg(long, env = "RGW_STATE", default_value = "rgw-state.json", global = true)]
    state: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    /// Run against an in-memory RGW
    #[arg(long, env = "STANDALONE", global = true)]
    standalone: bool,

    /// Write prometheus metrics to this file at exit
    #[arg(long, env = "RGW_METRICS_FILE", global = true)]
    metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the changes apply would make
    Plan {
        /// Manifest file
        #[arg(short, long, env = "RGW_MANIFEST", default_value = "rgw.yaml")]
        manifest: PathBuf,

        /// Refresh recorded resources before planning
        #[arg(long)]
        refresh: bool,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Refresh, then bring RGW in line with the manifest
    Apply {
        /// Manifest file
        #[arg(short, long, env = "RGW_MANIFEST", default_value = "rgw.yaml")]
        manifest: PathBuf,
    },
    /// Re-read every recorded resource and update the state file
    Refresh,
    /// Delete every recorded resource
    Destroy,
    /// Print the JSON schema of the manifest format
    Schema,
}

impl Args {
    fn backend(&self) -> rgw_reconciler::Result<BackendConfig> {
        if self.standalone {
            return Ok(BackendConfig::Standalone);
        }

        let endpoint = self
            .endpoint
            .clone()
            .ok_or_else(|| Error::Configuration("--endpoint or RGW_ENDPOINT is required".into()))?;
        let config = RgwConfig {
            endpoint,
            access_key: self.access_key.clone().unwrap_or_default(),
            secret_key: self.secret_key.clone().unwrap_or_default(),
            region: self.region.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            verify_tls: !self.insecure,
            ..Default::default()
        };
        config.validate()?;
        Ok(BackendConfig::Remote(config))
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    init_logging(&args);

    if let Command::Schema = args.command {
        let schema = serde_json::to_string_pretty(&Manifest::json_schema())?;
        println!("{}", schema);
        return Ok(ExitCode::SUCCESS);
    }

    info!("Starting {} {}", rgw_reconciler::NAME, rgw_reconciler::VERSION);
    info!("  State file: {}", args.state.display());
    info!("  Standalone mode: {}", args.standalone);

    let backend = args.backend()?;
    if args.standalone && args.state.exists() {
        warn!("Standalone mode starts from an empty RGW; recorded resources will be dropped on refresh");
    }
    let clients = BackendFactory::create(&backend).await?;
    let metrics = Arc::new(Metrics::new()?);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling in-flight operation");
            on_interrupt.cancel();
        }
    });

    let config = OrchestratorConfig {
        state_path: args.state.clone(),
        ..Default::default()
    };
    let mut orchestrator = Orchestrator::new(config, clients, metrics.clone(), cancel)?;

    let report = match &args.command {
        Command::Plan {
            manifest,
            refresh,
            json,
        } => {
            let manifest = load_manifest(manifest)?;
            let mut report = Report::default();
            if *refresh {
                report = orchestrator.refresh().await?;
            }
            let plan = orchestrator.plan(&manifest);
            if *json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                println!("{}", plan);
            }
            report
        }
        Command::Apply { manifest } => {
            let manifest = load_manifest(manifest)?;
            orchestrator.apply(&manifest).await?
        }
        Command::Refresh => orchestrator.refresh().await?,
        Command::Destroy => orchestrator.destroy().await?,
        Command::Schema => Report::default(),
    };

    print_diagnostics(&report.diagnostics);
    if !matches!(args.command, Command::Plan { .. }) {
        println!("{}", report);
    }

    if let Some(path) = &args.metrics_file {
        metrics
            .write_textfile(path)
            .with_context(|| format!("writing metrics to {}", path.display()))?;
    }

    if report.has_errors() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn load_manifest(path: &Path) -> anyhow::Result<Manifest> {
    Manifest::load(path).with_context(|| format!("loading manifest {}", path.display()))
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    for diagnostic in diagnostics.iter() {
        eprintln!("{}", diagnostic);
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => args.log_level.to_lowercase(),
        _ => "info".to_string(),
    };

    let directives = format!(
        "{},hyper=warn,rustls=warn,aws_config=warn,aws_smithy_runtime=warn,aws_sdk_s3=warn",
        level
    );
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directives))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
