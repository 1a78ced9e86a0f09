//! `fwup-pkg` - builds update packages for a static host.
//!
//! Turns every tracked branch of a repository into per-app, per-variant
//! archives, publishes each branch's latest pointer, and renders index pages.

mod cmd;
mod ui;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fwup-pkg")]
#[command(version, about = "fwup package builder", long_about = None)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build packages for every app, branch and variant
    Build {
        /// Repository to package
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        /// Static host tree to write into
        #[arg(short, long, default_value = "web_downloads")]
        output: PathBuf,
        /// Package the working tree under every branch name instead of each branch's commit
        #[arg(long)]
        no_checkout: bool,
        /// Remove the output directory first
        #[arg(long)]
        clean: bool,
        /// Concurrent package builds (default: number of CPUs)
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Bytecode compiler for the precompiled variant
        #[arg(long, env = "FWUP_COMPILER", default_value = "mpy-cross")]
        compiler: String,
        /// Extra compiler argument (repeatable)
        #[arg(long = "compiler-arg", allow_hyphen_values = true)]
        compiler_args: Vec<String>,
        /// Only build the source variant
        #[arg(long)]
        no_precompiled: bool,
    },
    /// List the apps declared in a repository
    Apps {
        /// Repository to scan
        #[arg(long, default_value = ".")]
        repo: PathBuf,
    },
    /// Show the embedded manifest and entries of a package archive
    Inspect {
        /// Package archive
        archive: PathBuf,
    },
    /// Print SHA-256 digests of files
    Hash {
        /// Files to hash
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Build {
            repo,
            output,
            no_checkout,
            clean,
            jobs,
            compiler,
            compiler_args,
            no_precompiled,
        } => {
            let options = cmd::build::BuildArgs {
                repo,
                output,
                no_checkout,
                clean,
                jobs: jobs.unwrap_or_else(num_cpus::get),
                compiler: (!no_precompiled).then_some((compiler, compiler_args)),
            };
            cmd::build::build(options).await
        }
        Commands::Apps { repo } => cmd::apps::apps(&repo),
        Commands::Inspect { archive } => cmd::inspect::inspect(&archive),
        Commands::Hash { files } => cmd::hash::hash(&files),
    }
}
