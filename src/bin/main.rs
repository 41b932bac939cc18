//! AegisSLO entry point
//!
//! `serve` runs the evaluation scheduler and the decision API; `validate`
//! checks a directory of SLO documents and exits non-zero on any error;
//! `check` queries a running server for a gate decision, for CI/CD jobs.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use aegis_slo::adapter::{MetricsAdapter, PrometheusAdapter, PrometheusConfig, SyntheticAdapter};
use aegis_slo::api::{create_router, AppState};
use aegis_slo::client::AegisClient;
use aegis_slo::config::{AdapterKind, ServerConfig};
use aegis_slo::eval::Evaluator;
use aegis_slo::policy::Engine;
use aegis_slo::scheduler::Scheduler;
use aegis_slo::slo::Validator;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "aegis-slo")]
#[command(about = "AegisSLO - SLO evaluation and deployment gating")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler and the HTTP decision API
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0", env = "AEGIS_HOST")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8080", env = "PORT")]
        port: u16,

        /// Directory containing SLO YAML files
        #[arg(long = "slo-dir", env = "AEGIS_SLO_DIR")]
        slo_dir: PathBuf,

        /// Metrics adapter type
        #[arg(long, value_enum, default_value = "synthetic", env = "AEGIS_ADAPTER")]
        adapter: AdapterKind,

        /// Prometheus server URL (required for the prometheus adapter)
        #[arg(long = "prometheus-url", env = "AEGIS_PROMETHEUS_URL")]
        prometheus_url: Option<String>,

        /// Directory of JSON metric fixtures for the synthetic adapter
        #[arg(long = "synthetic-fixtures", env = "AEGIS_FIXTURES_DIR")]
        synthetic_fixtures: Option<PathBuf>,

        /// Graceful shutdown timeout in seconds
        #[arg(long = "shutdown-timeout", default_value = "30")]
        shutdown_timeout: u64,
    },

    /// Validate SLO YAML files in a directory
    Validate {
        /// Directory containing SLO YAML files
        #[arg(short, long)]
        dir: PathBuf,
    },

    /// Request a gate decision from a running server
    Check {
        /// AegisSLO server URL
        #[arg(long, default_value = "http://localhost:8080", env = "AEGIS_URL")]
        url: String,

        /// SLO id to check
        #[arg(long = "slo")]
        slo_id: String,

        /// Force a fresh evaluation instead of the cached decision
        #[arg(long)]
        force_fresh: bool,

        /// Treat WARN as blocking
        #[arg(long)]
        fail_on_warn: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            slo_dir,
            adapter,
            prometheus_url,
            synthetic_fixtures,
            shutdown_timeout,
        } => {
            let config = ServerConfig {
                host,
                port,
                slo_directory: slo_dir,
                adapter,
                prometheus_url,
                fixtures_dir: synthetic_fixtures,
                shutdown_timeout: Duration::from_secs(shutdown_timeout),
            };
            serve(config).await
        }

        Commands::Validate { dir } => {
            std::process::exit(run_validate(&dir));
        }

        Commands::Check {
            url,
            slo_id,
            force_fresh,
            fail_on_warn,
        } => {
            let client = AegisClient::new(url);
            let check = client.gate_decision(&slo_id, force_fresh).await?;
            println!("{}", serde_json::to_string_pretty(&check.response)?);

            if !check.is_passing(fail_on_warn) {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;

    tracing::info!(
        port = config.port,
        slo_dir = %config.slo_directory.display(),
        adapter = %config.adapter,
        "starting AegisSLO server"
    );

    let metrics_adapter: Arc<dyn MetricsAdapter> = match config.adapter {
        AdapterKind::Prometheus => {
            let url = config
                .prometheus_url
                .clone()
                .unwrap_or_default();
            tracing::info!(url = %url, "using Prometheus adapter");
            Arc::new(PrometheusAdapter::new(PrometheusConfig::new(url))?)
        }
        AdapterKind::Synthetic => {
            let adapter = SyntheticAdapter::new();
            if let Some(fixtures_dir) = &config.fixtures_dir {
                let loaded = load_fixtures(&adapter, fixtures_dir)?;
                tracing::info!(
                    count = loaded,
                    dir = %fixtures_dir.display(),
                    "using synthetic adapter with fixtures"
                );
            } else {
                tracing::info!("using synthetic adapter (no fixtures directory specified)");
            }
            Arc::new(adapter)
        }
    };

    let evaluator = Arc::new(Evaluator::new(metrics_adapter));
    let policy_engine = Arc::new(Engine::new());
    let scheduler = Arc::new(Scheduler::new(
        evaluator,
        policy_engine,
        config.slo_directory.clone(),
    ));

    scheduler.load_slos().await?;
    scheduler.start()?;

    let state = Arc::new(AppState {
        scheduler: scheduler.clone(),
    });
    let router = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down scheduler");
    if tokio::time::timeout(config.shutdown_timeout, scheduler.stop())
        .await
        .is_err()
    {
        tracing::warn!("scheduler did not stop within the shutdown timeout");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

/// Load every `.json` file in `dir` as a fixture named after its stem
fn load_fixtures(adapter: &SyntheticAdapter, dir: &Path) -> anyhow::Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        adapter
            .load_fixture(name, &path)
            .map_err(|err| anyhow::anyhow!("fixture {}: {err}", path.display()))?;
        count += 1;
    }
    Ok(count)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn run_validate(dir: &Path) -> i32 {
    let validator = Validator::new();
    let errors = validator.validate_directory(dir);

    if errors.is_empty() {
        println!("✓ All SLO files are valid");
        return 0;
    }

    // Group by file for readable output, sorted for determinism.
    let mut by_file: BTreeMap<String, Vec<_>> = BTreeMap::new();
    for error in &errors {
        by_file.entry(error.file.clone()).or_default().push(error);
    }

    eprintln!("✗ Validation failed with {} error(s):\n", errors.len());
    for (file, file_errors) in by_file {
        let base = Path::new(&file)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&file);
        for error in file_errors {
            if error.path.is_empty() {
                eprintln!("{}: {}", base, error.message);
            } else {
                eprintln!("{}: {}: {}", base, error.path, error.message);
            }
        }
    }

    1
}
