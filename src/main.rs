//! plygate - cached image-to-PLY generation service
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use plygate::cli::{Cli, Commands};
use plygate::config::ConfigManager;
use plygate::error::PlygateResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> PlygateResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    // Config commands work even when the file is missing or broken
    if let Commands::Config(args) = cli.command {
        init_logging(cli.verbose, false);
        return plygate::cli::commands::config(args, &config_manager).await;
    }

    let config = config_manager.load().await?;
    init_logging(cli.verbose, config.general.log_format == "json");

    match cli.command {
        Commands::Config(_) => unreachable!("Config handled above"),
        Commands::Serve(args) => plygate::cli::commands::serve(args, &config).await,
        Commands::Sweep(args) => plygate::cli::commands::sweep(args, &config).await,
        Commands::Fingerprint(args) => plygate::cli::commands::fingerprint(args).await,
        Commands::Normalize(args) => plygate::cli::commands::normalize(args).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug; RUST_LOG overrides
fn init_logging(verbose: u8, json: bool) {
    let default = match verbose {
        0 => "plygate=warn,tower_http=warn",
        1 => "plygate=info,tower_http=info",
        _ => "plygate=debug,tower_http=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
