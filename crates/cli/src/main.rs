//! mm - concurrent S3 transfers and throttling-aware DynamoDB deletes

mod commands;
mod exit_code;
mod output;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use commands::{Commands, GlobalArgs};

/// Concurrent S3 transfers and throttling-aware DynamoDB deletes
#[derive(Parser, Debug)]
#[command(name = "mm", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.debug);

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl-C, cancelling in-flight transfers");
            token.cancel();
        }
    });

    commands::execute(cli.command, cli.global, cancel)
        .await
        .into()
}

/// Logs go to stderr so stdout stays clean for JSON output.
/// `RUST_LOG` wins over `--debug`.
fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
