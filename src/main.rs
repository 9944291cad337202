//! cachet-monitor - probes targets and reports their health to a Cachet
//! status page.

mod cachet;
mod config;
mod monitor;
mod probe;
mod scheduler;
mod template;

use cachet::{CachetClient, StatusApi};
use config::Config;
use monitor::{Monitor, MonitorContext};
use scheduler::Scheduler;

use clap::Parser;
use std::fs::File;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Monitors HTTP and DNS targets and reports incidents and metrics to Cachet.
#[derive(Parser, Debug)]
#[command(name = "cachet-monitor", version)]
struct Cli {
    /// Path or http(s) URL of the configuration (JSON, or YAML for .yaml/.yml)
    #[arg(short, long, value_name = "PATH")]
    config: String,

    /// Write logs to this file instead of stdout
    #[arg(long, value_name = "LOGPATH")]
    log: Option<String>,

    /// Name of this system, overrides `system_name`
    #[arg(long)]
    name: Option<String>,

    /// Tick immediately instead of waiting for the first interval
    #[arg(long)]
    immediate: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    config_test: bool,

    /// debug, info, warn, error or fatal
    #[arg(long, value_name = "LOGLEVEL", value_parser = parse_level)]
    log_level: Option<LevelFilter>,
}

fn parse_level(level: &str) -> Result<LevelFilter, String> {
    match level {
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" => Ok(LevelFilter::WARN),
        "error" | "fatal" => Ok(LevelFilter::ERROR),
        other => Err(format!("unknown '{}' as log level", other)),
    }
}

/// Initialize logging. `CACHET_DEV` forces debug output.
fn init_logging(cli: &Cli) -> Result<(), BoxError> {
    let level = if std::env::var("CACHET_DEV").is_ok_and(|v| !v.is_empty()) {
        Some(LevelFilter::DEBUG)
    } else {
        cli.log_level
    };

    let filter = match level {
        Some(level) => EnvFilter::new(format!("cachet_monitor={}", level)),
        None => EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .from_env_lossy()
            .add_directive("cachet_monitor=info".parse()?),
    };

    let layer = match &cli.log {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| format!("unable to open file '{}' for logging: {}", path, e))?;
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(filter)
                .boxed()
        }
        None => tracing_subscriber::fmt::layer().with_filter(filter).boxed(),
    };

    tracing_subscriber::registry().with(layer).init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode, BoxError> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let mut cfg = Config::load(&cli.config).await?;
    cfg.immediate = cli.immediate;
    if let Some(name) = &cli.name {
        cfg.system_name = name.clone();
    }
    cfg.apply_env();

    let report = cfg.validate();
    for error in &report.global {
        tracing::error!("{}", error);
    }
    for (index, errors) in &report.monitors {
        tracing::warn!("Configuration warnings for monitor #{}:", index);
        for error in errors {
            tracing::warn!(" - {}", error);
        }
    }
    if !report.global.is_empty() {
        tracing::error!("Invalid configuration");
        return Ok(ExitCode::FAILURE);
    }

    if cli.config_test {
        if report.is_valid() {
            tracing::info!("Configuration is valid!");
            return Ok(ExitCode::SUCCESS);
        }
        tracing::error!("Invalid configuration");
        return Ok(ExitCode::FAILURE);
    }

    tracing::debug!("Configuration valid");
    tracing::info!("System: {}", cfg.system_name);
    tracing::info!("API: {}", cfg.api.url);
    tracing::info!("Monitors: {}", cfg.monitors.len());

    let api: Arc<dyn StatusApi> =
        Arc::new(CachetClient::new(&cfg.api.url, &cfg.api.token, cfg.api.insecure)?);

    tracing::info!("Pinging cachet");
    if let Err(e) = api.ping().await {
        tracing::error!("Cannot ping cachet! {}", e);
        return Ok(ExitCode::FAILURE);
    }
    tracing::info!("Ping OK");

    let ctx = Arc::new(MonitorContext::new(&cfg, api));
    let scheduler = Scheduler::new();

    for (index, monitor_cfg) in cfg.monitors.into_iter().enumerate() {
        if report.is_excluded(index) {
            tracing::error!("Monitor #{} has been skipped (invalid configuration)", index);
            continue;
        }

        tracing::info!("Starting Monitor #{}:", index);
        tracing::info!("Features: \n - {}", monitor_cfg.describe().join("\n - "));

        let mut monitor = match Monitor::new(monitor_cfg, ctx.clone()) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!("Monitor #{} has been skipped: {}", index, e);
                continue;
            }
        };

        match monitor.init().await {
            Ok(()) => {
                scheduler.add_monitor(monitor).await;
                tracing::info!("Monitor #{} has been started", index);
            }
            Err(e) => tracing::error!("Monitor #{} has been skipped: {}", index, e),
        }
    }

    tokio::signal::ctrl_c().await?;

    tracing::warn!("Abort: Waiting monitors to finish");
    scheduler.shutdown().await;

    Ok(ExitCode::SUCCESS)
}
