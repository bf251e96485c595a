//! One extraction invocation, end to end.
//!
//! [`KpiExtractor::handle`] is the single boundary where every error turns
//! into a `{ok:false}` envelope. The session is released on every exit path,
//! including the invocation deadline.

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::browser::connect;
use crate::browser::BrowserConnector;
use crate::config::Settings;
use crate::error::{ExtractError, Result};
use crate::period::Period;
use crate::picker::DateRangeSelector;
use crate::ranking;
use crate::readiness::{self, ReadinessStep};
use crate::report::{self, Diagnostics, Envelope, HtmlDiag, HtmlReport, PageInfo, ReportParts};
use crate::session::credentials::CredentialBundle;
use crate::session::Session;
use crate::table;

/// What an invocation should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Validate configuration only.
    Ping,
    /// Load the target page and return its markup.
    Html,
    /// Full KPI extraction.
    Extract,
}

impl Mode {
    /// Unknown or missing values mean a normal extraction.
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("ping") => Mode::Ping,
            Some("html") => Mode::Html,
            _ => Mode::Extract,
        }
    }
}

/// Inputs of one invocation, as received from HTTP or the CLI.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub day: Option<String>,
    pub month: Option<String>,
    pub year: Option<String>,
    pub mode: Mode,
    pub top: Option<usize>,
}

impl InvocationRequest {
    pub fn extract(period: &Period, top: Option<usize>) -> Self {
        Self {
            day: Some(period.day.to_string()),
            month: Some(period.month.to_string()),
            year: Some(period.year.to_string()),
            mode: Mode::Extract,
            top,
        }
    }

    pub fn mode_only(mode: Mode) -> Self {
        Self {
            day: None,
            month: None,
            year: None,
            mode,
            top: None,
        }
    }
}

/// Runs invocations against one connector. Holds no per-invocation state.
#[derive(Clone)]
pub struct KpiExtractor {
    settings: Arc<Settings>,
    connector: Arc<dyn BrowserConnector>,
}

impl KpiExtractor {
    pub fn new(settings: Arc<Settings>, connector: Arc<dyn BrowserConnector>) -> Self {
        Self {
            settings,
            connector,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run one invocation. Never fails; errors become failure envelopes.
    pub async fn handle(&self, request: InvocationRequest) -> Envelope {
        let invocation_id = Uuid::new_v4();
        let span = tracing::info_span!("invocation", id = %invocation_id, mode = ?request.mode);

        async move {
            let started = Instant::now();
            let envelope = match request.mode {
                Mode::Ping => match CredentialBundle::from_settings(&self.settings) {
                    Ok(_) => Envelope::ping(),
                    Err(e) => Envelope::failure(e, elapsed_ms(started), None),
                },
                Mode::Html => self.handle_html(started).await,
                Mode::Extract => self.handle_extract(&request, started).await,
            };
            if envelope.is_ok() {
                info!(took_ms = elapsed_ms(started), "Invocation succeeded");
            } else {
                warn!(took_ms = elapsed_ms(started), "Invocation failed");
            }
            envelope
        }
        .instrument(span)
        .await
    }

    async fn handle_extract(&self, request: &InvocationRequest, started: Instant) -> Envelope {
        let period = match Period::parse(
            request.day.as_deref(),
            request.month.as_deref(),
            request.year.as_deref(),
        ) {
            Ok(period) => period,
            Err(e) => return Envelope::failure(e, elapsed_ms(started), None),
        };
        let bundle = match CredentialBundle::from_settings(&self.settings) {
            Ok(bundle) => bundle,
            Err(e) => return Envelope::failure(e, elapsed_ms(started), None),
        };
        let top_n = self.settings.effective_top_n(request.top);

        let mut slot = None;
        let mut diag = Diagnostics::default();
        let result = self
            .with_deadline(self.extract(&bundle, &period, top_n, &mut slot, &mut diag))
            .await;
        release(slot).await;

        match result {
            Ok(parts) => report::assemble(parts, elapsed_ms(started)),
            Err(e) => {
                warn!(stage = %diag.stage, "Extraction failed: {}", e);
                Envelope::failure(e, elapsed_ms(started), Some(diag))
            }
        }
    }

    async fn handle_html(&self, started: Instant) -> Envelope {
        let bundle = match CredentialBundle::from_settings(&self.settings) {
            Ok(bundle) => bundle,
            Err(e) => return Envelope::failure(e, elapsed_ms(started), None),
        };

        let mut slot = None;
        let mut diag = Diagnostics::default();
        let result = self
            .with_deadline(self.fetch_html(&bundle, &mut slot, &mut diag))
            .await;
        release(slot).await;

        match result {
            Ok((diag, html)) => Envelope::Html(HtmlReport {
                ok: true,
                diag,
                html,
                took_ms: elapsed_ms(started),
            }),
            Err(e) => Envelope::failure(e, elapsed_ms(started), Some(diag)),
        }
    }

    async fn with_deadline<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.settings.timeouts.invocation;
        match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => Err(ExtractError::DeadlineExceeded(limit.as_millis() as u64)),
        }
    }

    /// Connect, provision the session into `slot` and load the target page.
    async fn open_target<'s>(
        &self,
        bundle: &CredentialBundle,
        slot: &'s mut Option<Session>,
        diag: &mut Diagnostics,
    ) -> Result<&'s Session> {
        diag.stage("connect");
        let policy = self.settings.retry_policy();
        let browser =
            connect::connect_with_retry(self.connector.as_ref(), &bundle.endpoint, &policy)
                .await?;
        let session = slot.insert(Session::new(browser));

        diag.stage("session");
        session.provision(&bundle.cookies).await?;

        diag.stage("navigate");
        let page = session.page()?;
        page.goto(&self.settings.target_url).await?;
        Ok(session)
    }

    async fn fetch_html(
        &self,
        bundle: &CredentialBundle,
        slot: &mut Option<Session>,
        diag: &mut Diagnostics,
    ) -> Result<(HtmlDiag, String)> {
        let session = self.open_target(bundle, slot, diag).await?;
        let page = session.page()?;

        diag.stage("document");
        let ready =
            readiness::wait_until_ready(page, ReadinessStep::Document, &self.settings.timeouts)
                .await?;
        diag.readiness.push(ready);

        let html = page.content().await?;
        let html_diag = HtmlDiag {
            title: page.title().await.unwrap_or_default(),
            url: page.url().await.unwrap_or_default(),
            len: html.len(),
        };
        Ok((html_diag, html))
    }

    async fn extract(
        &self,
        bundle: &CredentialBundle,
        period: &Period,
        top_n: usize,
        slot: &mut Option<Session>,
        diag: &mut Diagnostics,
    ) -> Result<ReportParts> {
        let timeouts = &self.settings.timeouts;
        let session = self.open_target(bundle, slot, diag).await?;
        let page = session.page()?;

        diag.stage("initial-readiness");
        let initial = readiness::wait_until_ready(page, ReadinessStep::Initial, timeouts).await?;
        diag.readiness.push(initial);

        let page_info = PageInfo {
            title: page.title().await.unwrap_or_default(),
            url: page.url().await.unwrap_or_default(),
        };
        diag.title = Some(page_info.title.clone());
        diag.url = Some(page_info.url.clone());

        // Taken before committing so a table left over from the previous
        // filter is never read as the result.
        let baseline = table::snapshot(page).await;

        diag.stage("picker");
        let mut selector = DateRangeSelector::new(page, timeouts);
        let picked = selector.apply(period).await;
        diag.trail = selector.trail().to_vec();
        let picker = picked?;

        diag.stage("results-readiness");
        let results = readiness::wait_until_ready(page, ReadinessStep::Results, timeouts).await?;
        let results_ready = results.is_ready();
        diag.readiness.push(results);
        if results_ready {
            let refresh = table::wait_for_refresh(page, baseline.as_ref(), timeouts).await;
            diag.readiness.push(refresh);
        }

        diag.stage("table");
        let extraction = table::extract(page).await?;
        let kpis = table::kpi::read_kpis(page).await;

        diag.stage("ranking");
        let groups = ranking::rank(&extraction.rows, &self.settings.groups, top_n);
        info!(
            rows = extraction.rows.len(),
            groups = self.settings.groups.len(),
            "Extracted store sales for {}",
            period.formatted()
        );

        Ok(ReportParts {
            period: period.strings(),
            page: page_info,
            picker,
            kpis,
            groups,
            table_sample: extraction.sample,
            row_count: extraction.rows.len(),
            readiness: std::mem::take(&mut diag.readiness),
        })
    }
}

async fn release(slot: Option<Session>) {
    if let Some(session) = slot {
        session.teardown().await;
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
