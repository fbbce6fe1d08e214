//! replflash CLI - deploy MicroPython applications over the raw REPL

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use replflash::commands::{self, Context};

/// replflash - deploy MicroPython applications over the raw REPL
#[derive(Debug, Parser)]
#[command(name = "replflash")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project directory holding replflash.toml
    #[arg(short = 'w', long, global = true)]
    workspace: Option<String>,

    /// Serial device of the board, overriding the configuration
    #[arg(short, long, global = true)]
    port: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Copy a local file or directory to the board
    Deploy(commands::deploy::DeployArgs),

    /// Manage what the board runs on boot
    Autorun {
        #[command(subcommand)]
        command: commands::autorun::AutorunCommand,
    },

    /// List a remote directory
    Ls(commands::ls::LsArgs),

    /// Hex-dump a remote file
    Dump(commands::dump::DumpArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with indicatif layer for progress bar support
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .with(filter)
        .init();

    // Determine project root
    let project_root = if let Some(ref path) = cli.workspace {
        Utf8PathBuf::from(path)
    } else {
        std::env::current_dir()
            .ok()
            .and_then(|p| Utf8PathBuf::try_from(p).ok())
            .unwrap_or_else(|| Utf8PathBuf::from("."))
    };

    let ctx = Context::load(&project_root, cli.port).into_diagnostic()?;

    match cli.command {
        Commands::Deploy(args) => commands::deploy::run(&ctx, args),
        Commands::Autorun { command } => commands::autorun::run(&ctx, command),
        Commands::Ls(args) => commands::ls::run(&ctx, args),
        Commands::Dump(args) => commands::dump::run(&ctx, args),
    }
}
