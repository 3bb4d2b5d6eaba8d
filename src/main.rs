mod cli;
mod client;
mod config;
mod dispatch;
mod error;
mod server;
mod ssh;

use std::process::ExitCode;

use clap::Parser;
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "ferry=debug" } else { "ferry=info" };

    // stdout carries replies, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.execute().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", style("✗").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
