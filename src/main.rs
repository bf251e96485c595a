use clap::Parser;
use tracing_subscriber::EnvFilter;

use upseller_kpi::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries the JSON envelope.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,upseller_kpi=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    cli::run(Cli::parse()).await
}
