mod config;

use clap::Parser;
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use forwarder::errors::ForwarderError;
use metrics_exporter_statsd::StatsdBuilder;
use shared::metrics_defs::{MetricDef, MetricType};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const METRICS_PREFIX: &str = "traccar2forward";

#[derive(Parser)]
#[command(version, about = "Forwards Traccar position events to per-device destinations")]
enum CliCommand {
    /// Listen for Traccar events
    Run {
        /// YAML configuration file. Environment variables are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Dispatch a single event read from a file, then exit
    Replay {
        file: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl CliCommand {
    fn config_path(&self) -> Option<&Path> {
        match self {
            CliCommand::Run { config } | CliCommand::Replay { config, .. } => config.as_deref(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Forwarder(#[from] ForwarderError),
    #[error("could not read {path:?}: {source}")]
    ReadEvent {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not start runtime: {0}")]
    Runtime(std::io::Error),
    #[error("could not install metrics exporter: {0}")]
    Metrics(String),
}

fn main() -> ExitCode {
    let cli = CliCommand::parse();

    let config = match cli.config_path() {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _sentry = init_logging(&config.logging);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting traccar2forward");

    if let Some(metrics_config) = &config.metrics {
        if let Err(e) = init_metrics(metrics_config) {
            tracing::error!(error = %e, "Metrics disabled");
        }
    }

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: CliCommand, config: Config) -> Result<(), CliError> {
    let runtime = tokio::runtime::Runtime::new().map_err(CliError::Runtime)?;

    runtime.block_on(async move {
        match cli {
            CliCommand::Run { .. } => {
                tokio::select! {
                    result = forwarder::run(config.forwarder) => result?,
                    _ = shutdown_signal() => tracing::info!("Shutting down"),
                }
                Ok(())
            }
            CliCommand::Replay { file, .. } => replay(&config, &file).await,
        }
    })
}

async fn replay(config: &Config, file: &Path) -> Result<(), CliError> {
    let data = tokio::fs::read_to_string(file)
        .await
        .map_err(|source| CliError::ReadEvent {
            path: file.to_path_buf(),
            source,
        })?;

    let report = forwarder::replay(&config.forwarder, &data).await?;

    if let Some(err) = &report.rejected {
        tracing::warn!(error = %err, "Event rejected");
    }
    for delivery in &report.deliveries {
        match &delivery.result {
            Ok(()) => {
                tracing::info!(attribute = %delivery.attribute, kind = %delivery.kind, "Delivered")
            }
            Err(e) => {
                tracing::info!(attribute = %delivery.attribute, kind = %delivery.kind, error = %e, "Not delivered")
            }
        }
    }
    tracing::info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        "Replay finished"
    );

    Ok(())
}

/// `RUST_LOG` wins over the configured level. Returns the Sentry guard,
/// which must live until exit.
fn init_logging(logging: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.log_level.to_lowercase()));

    let sentry_guard = logging.sentry_dsn.as_deref().and_then(|dsn| {
        match dsn.parse::<sentry::types::Dsn>() {
            Ok(dsn) => Some(sentry::init(sentry::ClientOptions {
                dsn: Some(dsn),
                release: sentry::release_name!(),
                ..Default::default()
            })),
            Err(e) => {
                eprintln!("Ignoring invalid Sentry DSN: {e}");
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            sentry_guard
                .as_ref()
                .map(|_| sentry::integrations::tracing::layer()),
        )
        .init();

    sentry_guard
}

fn init_metrics(metrics_config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(&metrics_config.statsd_host, metrics_config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;

    describe_metrics(forwarder::metrics_defs::ALL_METRICS);
    tracing::info!(
        host = %metrics_config.statsd_host,
        port = metrics_config.statsd_port,
        "Reporting metrics to StatsD"
    );
    Ok(())
}

fn describe_metrics(defs: &[MetricDef]) {
    for def in defs {
        match def.metric_type {
            MetricType::Counter => metrics::describe_counter!(def.name, def.description),
            MetricType::Gauge => metrics::describe_gauge!(def.name, def.description),
            MetricType::Histogram => metrics::describe_histogram!(def.name, def.description),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
