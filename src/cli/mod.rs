//! CLI module for Daad Studio
//!
//! - `serve`: start the editor backend (WebSocket gateway + health)
//! - `run`: run a script in this terminal through the process bridge

use clap::{Parser, Subcommand};

use crate::server::config::AppConfig;

pub mod run;

/// Daad Studio CLI
#[derive(Parser, Debug)]
#[command(name = "daad-studio")]
#[command(about = "Editor backend for the daad (ض) language")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the editor backend
    Serve,
    /// Run a script in this terminal
    Run(run::RunArgs),
}

/// Run the CLI command
pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Serve) => crate::server::run(config).await,
        Some(Commands::Run(args)) => run::run(args, config).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
