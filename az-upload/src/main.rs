use clap::Parser;
use std::process;

use az_upload::cli::{run, Cli, CliError};
use az_upload::exitcode;
use az_upload_core::AzureStorageClient;

#[tokio::main]
async fn main() {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing for the CLI.
    tracing_subscriber::fmt::init();
    tracing::debug!("CLI application startup: tracing initialised, environment loaded");

    let cli = Cli::parse();

    let client = match AzureStorageClient::new() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(CliError::Storage(e).exit_code());
        }
    };

    let code = match run(cli, client).await {
        Ok(()) => exitcode::OK,
        Err(e) => {
            match &e {
                // Validation keeps the original's friendly stdout message.
                CliError::Usage(msg) => println!("{msg}"),
                _ => {
                    tracing::error!(error = %e, "Command failed");
                    eprintln!("Error: {e}");
                }
            }
            e.exit_code()
        }
    };
    process::exit(code);
}
