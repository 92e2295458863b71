/// VibeLang CLI
///
/// Validates, runs, reports on and compiles VibeLang programs.

use clap::Parser;
use tracing_subscriber::EnvFilter;
use vibelang_core::cli::{self, Cli};
use vibelang_core::config::Config;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // RUST_LOG wins over the configured filter
    let filter = Config::builder()
        .config_path(cli.config.clone())
        .build()
        .map(|config| config.logging.filter)
        .unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run_cli_with_args(cli).await {
        eprintln!("Error: {}", cli::error_message(&e));
        std::process::exit(cli::exit_code(&e));
    }
}
