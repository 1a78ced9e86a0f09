//! fwup - device update agent CLI

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use fwup_cli::ui::ConsoleReporter;
use fwup_cli::{Cli, Commands, cmd};
use fwup_core::Reporter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Completions { shell } = cli.command {
        cmd::completions::completions(shell);
        return Ok(());
    }

    let settings = cli.config.load()?;
    let reporter: Arc<dyn Reporter> = Arc::new(ConsoleReporter::new(cli.quiet));

    match cli.command {
        Commands::Check { dry_run } => cmd::check::check(&settings, dry_run, reporter).await,
        Commands::Run { cycles } => cmd::run::run(&settings, cycles, reporter).await,
        Commands::Status => cmd::status::status(&settings),
        Commands::Recover => cmd::recover::recover(&settings, reporter.as_ref()),
        Commands::Completions { .. } => Ok(()),
    }
}
