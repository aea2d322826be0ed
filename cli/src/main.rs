//! hatchery - keep self-hosted agent instances alive

use std::process::ExitCode;

use clap::Parser;
use hatchery_cli::cli::Cli;
use hatchery_cli::output::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("HATCHERY_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json_mode = cli.json;
    match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!("command failed: {e:?}");
            if json_mode {
                match json::format_error(&format!("{e:#}"), json::error_code(&e)) {
                    Ok(obj) => println!("{obj}"),
                    Err(_) => eprintln!("Error: {e:#}"),
                }
            } else {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}
