//! Herdux CLI Entry Point
//!
//! Parses arguments, sets up logging on stderr and runs one command.
//! Failures are printed as a single `✖ message` line with a nonzero exit.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use herdux::cli::{self, Cli, Context};
use herdux::config::{ConfigStore, HerduxConfig};
use herdux::process::SystemRunner;
use herdux::resolve::{is_interactive, TerminalPrompter};

/// Overrides the `-v` derived log filter
const LOG_ENV: &str = "HERDUX_LOG";

fn init_tracing(default_level: &str) {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_level(true)
                .with_target(false),
        )
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let store = ConfigStore::open_default()?;
    // `config` subcommands load the file themselves, so a broken file can still be reset
    let config = if cli.command.needs_connection() {
        store.load().context("could not load saved configuration")?
    } else {
        HerduxConfig::default()
    };

    let prompter = TerminalPrompter;
    let ctx = Context { store, config, runner: Arc::new(SystemRunner), prompter: &prompter, interactive: is_interactive() };
    cli::execute(&cli, &ctx).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.log_level());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("\n✖ {err:#}\n");
            ExitCode::FAILURE
        }
    }
}
