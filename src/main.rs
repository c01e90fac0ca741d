//! Daad Studio - editor backend for the daad (ض) language
//!
//! CLI entry point.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cli;
mod middleware;
mod server;
mod websocket;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();
    let config = server::load_config()?;

    // Keep the terminal quiet while a script owns it
    let default_filter = match cli.command {
        Some(cli::Commands::Run(_)) => "warn",
        _ => "daad_studio=info,daad_bridge=info,daad_files=info,tower_http=info",
    };

    let (file_layer, _log_guard) = match &config.logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "daad-studio.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    if matches!(cli.command, Some(cli::Commands::Serve)) {
        info!("Starting Daad Studio v{}", env!("CARGO_PKG_VERSION"));
    }

    cli::run(cli, config).await
}
