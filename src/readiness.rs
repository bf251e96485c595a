//! Page readiness detection.
//!
//! A page is ready when `document.readyState` is `complete` and at least one
//! structural marker for the current step is visible. A destroyed execution
//! context means the SPA swapped its document; polling simply continues.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::browser::PageDriver;
use crate::config::Timeouts;
use crate::error::{BrowserError, ExtractError, Result};

/// Markers that the dashboard shell, including its date filter, has rendered.
pub(crate) const INITIAL_MARKERS: &[&str] = &[
    ".ant-picker-input input",
    ".ant-picker-range",
    ".ant-picker",
    ".ant-calendar-picker",
    "input[placeholder*=\"Data\"]",
    "[data-testid*=\"date\"]",
    "[class*=\"date\"]",
    "[class*=\"calendar\"]",
];

/// Markers that results (table or KPI widgets) are on screen.
pub(crate) const RESULTS_MARKERS: &[&str] = &[
    ".ant-table",
    "[class*=\"table\"]",
    ".ant-statistic",
    "[class*=\"statistic\"]",
];

/// Spinner antd overlays on a results area while it reloads.
pub(crate) const LOADING_MARKER: &str = ".ant-spin-spinning";

/// Which readiness condition to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessStep {
    /// After the first navigation. Timing out is fatal.
    Initial,
    /// After the date filter was applied. Timing out is tolerated.
    Results,
    /// Load-complete only, used to resynchronise after a DOM swap.
    Document,
    /// The results table differs from its pre-filter snapshot.
    Refresh,
}

impl ReadinessStep {
    pub fn markers(&self) -> &'static [&'static str] {
        match self {
            ReadinessStep::Initial => INITIAL_MARKERS,
            ReadinessStep::Results => RESULTS_MARKERS,
            ReadinessStep::Document | ReadinessStep::Refresh => &[],
        }
    }

    pub fn timeout(&self, timeouts: &Timeouts) -> Duration {
        match self {
            ReadinessStep::Initial => timeouts.initial_ready,
            ReadinessStep::Results => timeouts.results_ready,
            ReadinessStep::Document => timeouts.resync,
            ReadinessStep::Refresh => timeouts.refresh,
        }
    }

    fn is_fatal(&self) -> bool {
        matches!(self, ReadinessStep::Initial)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessOutcome {
    Ready,
    TimedOut,
}

/// Result of one readiness wait, echoed in the response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessReport {
    pub step: ReadinessStep,
    pub outcome: ReadinessOutcome,
    pub waited_ms: u64,
    /// Marker that satisfied the check, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    /// How many destroyed-context signals were absorbed.
    pub resyncs: u32,
}

impl ReadinessReport {
    pub fn is_ready(&self) -> bool {
        self.outcome == ReadinessOutcome::Ready
    }
}

/// Poll until the step's condition holds or its timeout elapses.
pub async fn wait_until_ready(
    page: &dyn PageDriver,
    step: ReadinessStep,
    timeouts: &Timeouts,
) -> Result<ReadinessReport> {
    let limit = step.timeout(timeouts);
    let started = Instant::now();
    let deadline = started + limit;
    let mut resyncs = 0u32;

    loop {
        // A hung evaluate must not stretch the wait past the step deadline.
        let remaining = deadline.saturating_duration_since(Instant::now());
        let checked = match tokio::time::timeout(remaining, check(page, step)).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::Timeout {
                action: "readiness check".to_string(),
                timeout_ms: remaining.as_millis() as u64,
            }),
        };
        match checked {
            Ok(Some(marker)) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                debug!(step = ?step, waited_ms, "Page ready");
                return Ok(ReadinessReport {
                    step,
                    outcome: ReadinessOutcome::Ready,
                    waited_ms,
                    marker: (!marker.is_empty()).then_some(marker),
                    resyncs,
                });
            }
            Ok(None) => {}
            Err(e) if e.is_context_destroyed() => {
                resyncs += 1;
                debug!(step = ?step, "Execution context destroyed while polling; resyncing");
            }
            Err(BrowserError::Timeout { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        if Instant::now() >= deadline {
            let waited_ms = limit.as_millis() as u64;
            if step.is_fatal() {
                return Err(ExtractError::PageNotReady {
                    step: format!("{:?}", step).to_lowercase(),
                    waited_ms,
                });
            }
            warn!(step = ?step, waited_ms, "Readiness wait timed out; continuing");
            return Ok(ReadinessReport {
                step,
                outcome: ReadinessOutcome::TimedOut,
                waited_ms,
                marker: None,
                resyncs,
            });
        }

        tokio::time::sleep(timeouts.poll_interval).await;
    }
}

/// One readiness check. `Some("")` means ready without a marker requirement.
async fn check(
    page: &dyn PageDriver,
    step: ReadinessStep,
) -> std::result::Result<Option<String>, BrowserError> {
    if page.ready_state().await? != "complete" {
        return Ok(None);
    }
    let markers = step.markers();
    if markers.is_empty() {
        return Ok(Some(String::new()));
    }
    if step == ReadinessStep::Results && page.is_visible(LOADING_MARKER).await? {
        return Ok(None);
    }
    for marker in markers {
        if page.is_visible(marker).await? {
            return Ok(Some((*marker).to_string()));
        }
    }
    Ok(None)
}
