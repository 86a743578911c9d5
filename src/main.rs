//! Hatlink - shared supervisor for a line-oriented device worker process.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hatlink::config::{ConfigError, ConfigLoader, HatlinkConfig};
use hatlink::display;
use hatlink::node::OutputNode;
use hatlink::supervisor::{LinkStatus, SupervisorError, SupervisorRegistry};
use hatlink::worker::check_executable;

#[derive(Parser)]
#[command(
    name = "hatlink",
    about = "Shared supervisor for a line-oriented device worker",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file (default: $HATLINK_CONFIG, .hatlink.toml, then ~/.config/hatlink/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Worker executable, overriding $HATLINK_WORKER and the config file.
    #[arg(short, long, global = true)]
    worker: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forward values read from stdin (one JSON value or word per line) to the worker.
    Run,
    /// Verify that the worker executable can be started.
    Check,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<HatlinkConfig, ConfigError> {
    ConfigLoader::from_env()
        .config_file(cli.config.clone())
        .worker(cli.worker.clone())
        .load()
}

/// Interpret one stdin line as a message payload.
fn parse_input(line: &str) -> serde_json::Value {
    serde_json::from_str(line).unwrap_or_else(|_| serde_json::Value::String(line.to_string()))
}

async fn run(config: &HatlinkConfig) -> Result<(), CliError> {
    let registry = SupervisorRegistry::new();
    let supervisor = registry.get_or_init(&config.worker)?;
    let name = supervisor.name();
    tracing::info!(worker = %name, "Starting hatlink");

    let node = OutputNode::open(&supervisor, move |status: LinkStatus| {
        display::print_status(&name, status);
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if !node.input(&parse_input(line)) {
                        display::print_ignored(line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    }

    node.close(|| tracing::debug!("Output node closed"));
    registry.shutdown_all().await;
    Ok(())
}

fn check(config: &HatlinkConfig) -> Result<(), CliError> {
    let path = config
        .worker
        .resolve_path()
        .map_err(SupervisorError::InstallDir)?;
    check_executable(&path).map_err(SupervisorError::from)?;
    display::print_worker_ok(&path);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match load_config(&cli) {
        Ok(config) => match cli.command {
            Commands::Run => run(&config).await,
            Commands::Check => check(&config),
        },
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        display::print_error(&e.to_string());
        std::process::exit(1);
    }
}
