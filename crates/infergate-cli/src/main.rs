//! CLI entry point - the composition root.

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use infergate_cli::{Cli, Commands, handlers};
use infergate_runtime::FatalHandler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before anything reads them
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let fatal = FatalHandler::default();
    let result = match cli.command {
        Commands::Serve(args) => handlers::serve::execute(args, fatal.clone()).await,
        Commands::Batch(args) => handlers::batch::execute(args, &fatal).await.map(|_| ()),
    };

    if let Err(e) = result {
        error!(error = %e, "infergate failed");
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
    Ok(())
}
