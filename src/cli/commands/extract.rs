//! One-shot invocation commands.

use crate::period;
use crate::pipeline::{InvocationRequest, KpiExtractor, Mode};

use super::super::helpers::print_envelope;

/// Extract KPIs for one day. Missing date parts default to today.
pub async fn cmd_extract(
    extractor: &KpiExtractor,
    day: Option<String>,
    month: Option<String>,
    year: Option<String>,
    top: Option<usize>,
    compact: bool,
) -> anyhow::Result<()> {
    let today = period::today();
    let request = InvocationRequest {
        day: Some(day.unwrap_or_else(|| today.day.to_string())),
        month: Some(month.unwrap_or_else(|| today.month.to_string())),
        year: Some(year.unwrap_or_else(|| today.year.to_string())),
        mode: Mode::Extract,
        top,
    };
    run(extractor, request, compact).await
}

/// Validate configuration only.
pub async fn cmd_ping(extractor: &KpiExtractor, compact: bool) -> anyhow::Result<()> {
    run(extractor, InvocationRequest::mode_only(Mode::Ping), compact).await
}

/// Load the target page and print its HTML.
pub async fn cmd_html(extractor: &KpiExtractor, compact: bool) -> anyhow::Result<()> {
    run(extractor, InvocationRequest::mode_only(Mode::Html), compact).await
}

async fn run(
    extractor: &KpiExtractor,
    request: InvocationRequest,
    compact: bool,
) -> anyhow::Result<()> {
    let envelope = extractor.handle(request).await;
    if print_envelope(&envelope, compact)? {
        Ok(())
    } else {
        anyhow::bail!("invocation failed")
    }
}
