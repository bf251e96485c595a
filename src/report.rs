//! Response envelopes.
//!
//! Every invocation ends in exactly one [`Envelope`]. Successful and failed
//! runs share the `ok` and `tookMs` fields so callers can branch on `ok`
//! without knowing the mode.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::period::PeriodStrings;
use crate::picker::{PickerOutcome, PickerState};
use crate::ranking::RankedGroups;
use crate::readiness::ReadinessReport;
use crate::table::kpi::KpiValue;
use crate::table::TableSample;

/// Title and URL of the page that was scraped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageInfo {
    pub title: String,
    pub url: String,
}

/// Full extraction result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    pub ok: bool,
    pub period: PeriodStrings,
    pub page: PageInfo,
    pub picker: PickerOutcome,
    pub kpis: BTreeMap<String, KpiValue>,
    pub groups: RankedGroups,
    pub table_sample: TableSample,
    pub row_count: usize,
    pub readiness: Vec<ReadinessReport>,
    pub took_ms: u64,
}

/// Configuration liveness check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingReport {
    pub ok: bool,
    pub ping: &'static str,
    #[serde(rename = "hasWS")]
    pub has_ws: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HtmlDiag {
    pub title: String,
    pub url: String,
    pub len: usize,
}

/// Raw page markup, for selector debugging.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlReport {
    pub ok: bool,
    pub diag: HtmlDiag,
    pub html: String,
    pub took_ms: u64,
}

/// Partial progress attached to a failure.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    /// Last pipeline stage entered.
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trail: Vec<PickerState>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub readiness: Vec<ReadinessReport>,
}

impl Diagnostics {
    pub fn stage(&mut self, stage: &str) {
        tracing::debug!(stage, "Entering stage");
        self.stage = stage.to_string();
    }

    /// True when nothing beyond validation happened.
    pub fn is_empty(&self) -> bool {
        self.stage.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub ok: bool,
    pub error: String,
    pub took_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diag: Option<Diagnostics>,
}

/// The uniform response of one invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    Extraction(Box<ExtractionReport>),
    Ping(PingReport),
    Html(HtmlReport),
    Failure(FailureReport),
}

impl Envelope {
    pub fn ping() -> Self {
        Envelope::Ping(PingReport {
            ok: true,
            ping: "alive",
            has_ws: true,
        })
    }

    pub fn failure(error: impl ToString, took_ms: u64, diag: Option<Diagnostics>) -> Self {
        Envelope::Failure(FailureReport {
            ok: false,
            error: error.to_string(),
            took_ms,
            diag: diag.filter(|d| !d.is_empty()),
        })
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, Envelope::Failure(_))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({ "ok": false, "error": format!("serialization failed: {}", e) })
        })
    }
}

/// Inputs collected by the pipeline for one successful run.
pub struct ReportParts {
    pub period: PeriodStrings,
    pub page: PageInfo,
    pub picker: PickerOutcome,
    pub kpis: BTreeMap<String, KpiValue>,
    pub groups: RankedGroups,
    pub table_sample: TableSample,
    pub row_count: usize,
    pub readiness: Vec<ReadinessReport>,
}

/// Build the success envelope.
pub fn assemble(parts: ReportParts, took_ms: u64) -> Envelope {
    Envelope::Extraction(Box::new(ExtractionReport {
        ok: true,
        period: parts.period,
        page: parts.page,
        picker: parts.picker,
        kpis: parts.kpis,
        groups: parts.groups,
        table_sample: parts.table_sample,
        row_count: parts.row_count,
        readiness: parts.readiness,
        took_ms,
    }))
}
