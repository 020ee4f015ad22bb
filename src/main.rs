use clap::Parser;
use gofr_bootstrap::cli::{exit_code, run_cli, Cli};

#[tokio::main]
async fn main() {
    // Load .env file if it exists (optional - won't fail if missing)
    // This must happen before any config is read from environment
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    if let Err(error) = run_cli(cli).await {
        let code = exit_code(&error);
        eprintln!("Error: {:#}", error);
        std::process::exit(code);
    }
}
