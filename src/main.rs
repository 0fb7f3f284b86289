use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use zsm_console::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let app = Cli::parse();
    init_tracing(app.global.debug);

    match app.command {
        Commands::Console(args) => cli::console::run(&app.global, args).await,
        Commands::Deploy(args) => cli::deploy::run(&app.global, args).await,
        Commands::Nodes(args) => cli::nodes::run(&app.global, args).await,
        Commands::Completion(args) => cli::completion::run(args),
    }
}

/// Logs go to stderr so they never interleave with rendered output.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("zsm_console=debug,zsm=debug")
    } else {
        EnvFilter::try_from_env("ZSM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
