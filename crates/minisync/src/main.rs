//! minisync CLI - live reload development server.
//!
//! Provides commands for:
//! - `serve`: Serve directories and reload browsers when files change
//! - `listen`: Follow a running server from the terminal

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{ListenArgs, ServeArgs};
use error::CliError;
use output::{Output, Tone};

/// minisync - live reload development server.
#[derive(Parser)]
#[command(name = "minisync", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve directories with live reload.
    Serve(ServeArgs),
    /// Connect to a running server and print what a browser would reload.
    Listen(ListenArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    let verbose = match &cli.command {
        Commands::Serve(args) => args.verbose,
        Commands::Listen(args) => args.verbose,
    };

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = tokio::runtime::Runtime::new()
        .map_err(CliError::from)
        .and_then(|rt| match cli.command {
            Commands::Serve(args) => rt.block_on(args.execute()),
            Commands::Listen(args) => rt.block_on(args.execute()),
        });

    if let Err(err) = result {
        output.line(Tone::Bad, &format!("Error: {err}"));
        std::process::exit(1);
    }
}
