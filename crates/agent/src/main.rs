//! Speedtest agent - scheduled network measurement collector
//!
//! This binary measures network throughput and latency against a speedtest
//! service on a configurable cadence and logs every measurement into
//! InfluxDB. Core functionality is provided by the `agent-lib` crate.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agent_lib::cadence::parse_cadence;
use agent_lib::config::{ConfigError, Settings};
use agent_lib::cycle::{CycleRunner, OutputOptions};
use agent_lib::error::AgentError;
use agent_lib::scheduler::Scheduler;
use agent_lib::speedtest::HttpSpeedtestProvider;
use agent_lib::storage::InfluxPublisher;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log verbosity levels selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Retrieves upload/download information from a speedtest service and logs
/// it into InfluxDB.
#[derive(Debug, Parser)]
#[command(name = "speedtest-agent", version, about)]
struct Cli {
    /// Path to the JSON configuration file.
    config: PathBuf,

    /// Log verbosity.
    #[arg(long = "log", value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Log destination file; stderr when omitted.
    #[arg(short = 'l', long)]
    log_file: Option<PathBuf>,

    /// Directory receiving raw result dumps.
    #[arg(short = 'o', long = "output", default_value = "./")]
    output_dir: PathBuf,

    /// Run a single measurement cycle and exit.
    #[arg(short = '1', long)]
    single: bool,

    /// Save the unmodified JSON result of every cycle.
    #[arg(short = 'j', long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    info!(
        version = AGENT_VERSION,
        config = %cli.config.display(),
        "starting speedtest-agent"
    );

    let (settings, cadence) = match startup(&cli) {
        Ok(loaded) => loaded,
        Err(err) => {
            let err = AgentError::from(err);
            error!(kind = %err.kind(), error = %err, "fatal startup error");
            return Err(err.into());
        }
    };

    let provider = HttpSpeedtestProvider::new(&settings.speedtest.endpoint)
        .context("failed to initialize measurement provider")?;
    let publisher =
        InfluxPublisher::new(&settings.database).context("failed to initialize storage publisher")?;

    let runner = CycleRunner::new(
        settings.speedtest.clone(),
        OutputOptions {
            dump_raw: cli.json,
            directory: cli.output_dir.clone(),
        },
        Arc::new(provider),
        Arc::new(publisher),
    );

    let scheduler = if cli.single {
        Scheduler::once()
    } else {
        Scheduler::forever(cadence)
    };
    info!(
        single = cli.single,
        cadence_secs = cadence.as_secs(),
        database = %settings.database.name,
        "configuration loaded"
    );

    scheduler.run(|| runner.run()).await;
    Ok(())
}

/// Load and validate everything required before the first cycle.
///
/// Any failure here is fatal; the process must not enter the loop with a
/// partial configuration.
fn startup(cli: &Cli) -> Result<(Settings, Duration), ConfigError> {
    let settings = Settings::load(&cli.config)?;
    let cadence = parse_cadence(settings.config.cadence_token())?;
    if !cli.output_dir.is_dir() {
        return Err(ConfigError::Invalid(format!(
            "output directory {} does not exist",
            cli.output_dir.display()
        )));
    }
    Ok((settings, cadence))
}

/// Initialize tracing with an env-filter from the chosen level and an
/// optional file destination.
fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter()));
    let registry = tracing_subscriber::registry().with(filter);

    match &cli.log_file {
        Some(path) => {
            let file = std::fs::File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            registry.with(fmt::layer().json().with_writer(Arc::new(file))).init();
        }
        None => registry.with(fmt::layer()).init(),
    }
    Ok(())
}
