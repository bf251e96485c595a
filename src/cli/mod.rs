//! Command-line interface.

pub mod commands;
pub mod helpers;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::browser::BrowserConnector;
use crate::config::{self, LoadOptions, Settings};
use crate::pipeline::KpiExtractor;

#[derive(Parser)]
#[command(name = "upseller-kpi")]
#[command(version, about = "Daily store-sales KPIs from the UpSeller dashboard")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON config file (skips config discovery)
    #[arg(long, global = true, env = "UPS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Dashboard page to drive
    #[arg(long, global = true)]
    pub target_url: Option<String>,

    /// Print single-line JSON
    #[arg(long, global = true)]
    pub compact: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, env = "UPS_BIND")]
        bind: Option<String>,
    },

    /// Extract KPIs for one day (defaults to today)
    Extract {
        #[arg(short, long)]
        day: Option<String>,
        #[arg(short, long)]
        month: Option<String>,
        #[arg(short, long)]
        year: Option<String>,
        /// Rows per group
        #[arg(long)]
        top: Option<usize>,
    },

    /// Validate configuration without connecting
    Ping,

    /// Dump the target page's HTML
    Html,
}

/// Load settings, apply CLI overrides and dispatch.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = config::load_settings_with_options(LoadOptions {
        config_path: cli.config.clone(),
    })
    .await;
    if let Some(url) = cli.target_url.clone() {
        settings.target_url = url;
    }

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                settings.bind = bind;
            }
            commands::serve::cmd_serve(build_extractor(settings)?).await
        }
        Commands::Extract {
            day,
            month,
            year,
            top,
        } => {
            let extractor = build_extractor(settings)?;
            commands::extract::cmd_extract(&extractor, day, month, year, top, cli.compact).await
        }
        Commands::Ping => {
            let extractor = build_extractor(settings)?;
            commands::extract::cmd_ping(&extractor, cli.compact).await
        }
        Commands::Html => {
            let extractor = build_extractor(settings)?;
            commands::extract::cmd_html(&extractor, cli.compact).await
        }
    }
}

fn build_extractor(settings: Settings) -> anyhow::Result<KpiExtractor> {
    let connector = default_connector(&settings)?;
    Ok(KpiExtractor::new(Arc::new(settings), connector))
}

#[cfg(feature = "browser")]
fn default_connector(settings: &Settings) -> anyhow::Result<Arc<dyn BrowserConnector>> {
    Ok(Arc::new(crate::browser::cdp::CdpConnector::new(
        settings.timeouts.clone(),
    )))
}

#[cfg(not(feature = "browser"))]
fn default_connector(_settings: &Settings) -> anyhow::Result<Arc<dyn BrowserConnector>> {
    anyhow::bail!("built without the `browser` feature; rebuild with --features browser")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_extract() {
        let cli = Cli::try_parse_from([
            "upseller-kpi",
            "extract",
            "--day",
            "5",
            "--month",
            "3",
            "--year",
            "2025",
            "--top",
            "3",
        ])
        .expect("parse extract");
        match cli.command {
            Commands::Extract { day, top, .. } => {
                assert_eq!(day.as_deref(), Some("5"));
                assert_eq!(top, Some(3));
            }
            _ => panic!("expected extract"),
        }
    }

    #[test]
    fn test_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["upseller-kpi", "ping", "--compact"]).expect("parse ping");
        assert!(matches!(cli.command, Commands::Ping));
        assert!(cli.compact);
    }

    #[test]
    fn test_parses_serve_bind() {
        let cli = Cli::try_parse_from(["upseller-kpi", "serve", "--bind", "127.0.0.1:8080"])
            .expect("parse serve");
        assert!(matches!(
            cli.command,
            Commands::Serve { bind: Some(ref b) } if b == "127.0.0.1:8080"
        ));
    }
}
