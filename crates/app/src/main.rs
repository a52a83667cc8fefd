use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod clipboard;
mod commands;

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so streamed answers on stdout stay clean.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match commands::execute(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {}", snafu::Report::from_error(error));
            ExitCode::FAILURE
        }
    }
}
