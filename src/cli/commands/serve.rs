//! HTTP server command.

use console::style;

use crate::pipeline::KpiExtractor;

/// Serve the HTTP API until interrupted.
pub async fn cmd_serve(extractor: KpiExtractor) -> anyhow::Result<()> {
    let settings = extractor.settings();
    let bind = settings.bind.clone();

    if settings.browser_ws.is_none() {
        eprintln!(
            "{} {} is not set; extraction requests will fail until it is",
            style("!").yellow(),
            crate::config::ENV_BROWSER_WS
        );
    }
    eprintln!("{:<16} {}", "Target:", settings.target_url);
    eprintln!(
        "{:<16} {}",
        "Groups:",
        settings
            .groups
            .iter()
            .map(|g| g.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    crate::server::serve(extractor, &bind).await
}
