//! arrsync CLI
//!
//! Reconciles prowlarr, sonarr, radarr and lidarr instances against a
//! declarative document.

mod cli;
mod commands;
mod credentials;
mod error;
mod logging;
mod output;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands};
use error::Result;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            std::process::exit(e.exit_code());
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let verbose = cli.verbose > 0;
    match cli.command {
        Commands::Validate { document } => commands::run_validate(&document),
        Commands::Sync(args) => runtime()?.block_on(commands::run_sync(&args, verbose)),
        Commands::Plan(args) => runtime()?.block_on(commands::run_plan(&args, verbose)),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}
