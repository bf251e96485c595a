//! Scripted in-memory browser for tests.
//!
//! [`FakePage`] models just enough of the dashboard to exercise the
//! pipeline: a date picker in one of its variants, readiness markers, a
//! results table and statistic cards. Every interaction is appended to a
//! shared log so tests can assert on what the pipeline did.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Days, NaiveDate};
use tokio::time::Instant;

use super::{
    BrowserConnector, BrowserResult, CardQuery, ContextHandle, PageDriver, RawTable, RemoteBrowser,
};
use crate::error::BrowserError;
use crate::picker::grid::{
    DAY_CELL_FALLBACK, LEGACY_MONTH_SELECT, LEGACY_YEAR_SELECT, MODERN_HEADING, NEXT_BUTTON,
    PREV_BUTTON,
};
use crate::picker::variant::{LEGACY_INPUT_SELECTOR, MODERN_INPUT_SELECTORS};
use crate::picker::{OK_BUTTON_SELECTOR, OPENER_SELECTORS, PANEL_SELECTOR};
use crate::readiness::{INITIAL_MARKERS, LOADING_MARKER, RESULTS_MARKERS};
use crate::session::credentials::SessionCookie;
use crate::table::kpi::{CARD_TITLE_ITEM, STATISTIC_ITEM};

const MONTH_ABBR: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Which date widget the simulated dashboard renders.
#[derive(Debug, Clone)]
pub(crate) enum Widget {
    DualInput { legacy: bool },
    SingleInput,
    Grid {
        shown: (i32, u32),
        panels: usize,
        legacy: bool,
    },
    Missing,
}

#[derive(Debug)]
struct FakeState {
    widget: Widget,
    panel_open: bool,
    inputs: Vec<String>,
    typing_fails: bool,
    destroy_on_open: bool,
    ready_states: VecDeque<BrowserResult<String>>,
    markers_present: bool,
    results_visible: bool,
    cell_clicks: usize,
    committed_at: Option<Instant>,
    render_delay: Duration,
    stale_table: Option<RawTable>,
    spinner: bool,
    table: Option<RawTable>,
    stats: Vec<(String, String)>,
    card_titles: Vec<(String, String)>,
    blocks: Vec<String>,
    goto_delay: Option<Duration>,
    ready_state_delay: Option<Duration>,
    failing_close: bool,
    url: String,
    log: Vec<String>,
}

/// Shared handle to the simulated page. Clones observe the same state.
#[derive(Debug, Clone)]
pub(crate) struct FakePage {
    state: Arc<Mutex<FakeState>>,
}

impl FakePage {
    fn with_widget(widget: Widget) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                widget,
                panel_open: false,
                inputs: vec![String::new(), String::new()],
                typing_fails: false,
                destroy_on_open: false,
                ready_states: VecDeque::new(),
                markers_present: true,
                results_visible: false,
                cell_clicks: 0,
                committed_at: None,
                render_delay: Duration::ZERO,
                stale_table: None,
                spinner: false,
                table: Some(sample_table()),
                stats: vec![
                    ("Vendas válidas".to_string(), "R$ 3.683,65".to_string()),
                    ("Pedidos válidos".to_string(), "42".to_string()),
                ],
                card_titles: vec![("Ticket médio".to_string(), "R$ 87,71".to_string())],
                blocks: vec![
                    "Conversão hoje 3,4%".to_string(),
                    "Itens por pedido 1,8".to_string(),
                ],
                goto_delay: None,
                ready_state_delay: None,
                failing_close: false,
                url: "about:blank".to_string(),
                log: Vec::new(),
            })),
        }
    }

    pub fn dual_input(legacy: bool) -> Self {
        Self::with_widget(Widget::DualInput { legacy })
    }

    pub fn single_input() -> Self {
        Self::with_widget(Widget::SingleInput)
    }

    pub fn grid(shown: (i32, u32), panels: usize, legacy: bool) -> Self {
        Self::with_widget(Widget::Grid {
            shown,
            panels,
            legacy,
        })
    }

    pub fn without_picker() -> Self {
        Self::with_widget(Widget::Missing)
    }

    pub fn typing_fails(self) -> Self {
        self.lock().typing_fails = true;
        self
    }

    pub fn destroy_context_on_first_open(self) -> Self {
        self.lock().destroy_on_open = true;
        self
    }

    pub fn with_ready_states(self, states: Vec<BrowserResult<String>>) -> Self {
        self.lock().ready_states = states.into();
        self
    }

    pub fn without_markers(self) -> Self {
        self.lock().markers_present = false;
        self
    }

    pub fn with_table(self, table: Option<RawTable>) -> Self {
        self.lock().table = table;
        self
    }

    pub fn with_goto_delay(self, delay: Duration) -> Self {
        self.lock().goto_delay = Some(delay);
        self
    }

    /// Results from the previous filter are on screen from the start; the
    /// new table replaces them `delay` after the commit.
    pub fn with_stale_results(self, delay: Duration) -> Self {
        {
            let mut state = self.lock();
            state.results_visible = true;
            state.render_delay = delay;
            state.stale_table = Some(stale_table());
        }
        self
    }

    /// Show the loading spinner while the new results render.
    pub fn with_loading_spinner(self) -> Self {
        self.lock().spinner = true;
        self
    }

    /// Every `readyState` evaluation hangs for `delay`.
    pub fn with_slow_ready_state(self, delay: Duration) -> Self {
        self.lock().ready_state_delay = Some(delay);
        self
    }

    /// Page and context close calls fail.
    pub fn failing_close(self) -> Self {
        self.lock().failing_close = true;
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    pub fn inputs(&self) -> Vec<String> {
        self.lock().inputs.clone()
    }

    pub fn shown_month(&self) -> Option<(i32, u32)> {
        match self.lock().widget {
            Widget::Grid { shown, .. } => Some(shown),
            _ => None,
        }
    }

    fn record(&self, entry: impl Into<String>) {
        self.lock().log.push(entry.into());
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Table left over from the filter applied before ours.
pub(crate) fn stale_table() -> RawTable {
    RawTable {
        rows: vec![vec![
            "MELI STALE".to_string(),
            "99".to_string(),
            "R$ 9.999,00".to_string(),
        ]],
        ..sample_table()
    }
}

/// Store-sales table as the dashboard renders it, including a summary row.
pub(crate) fn sample_table() -> RawTable {
    let row = |store: &str, orders: &str, sales: &str| {
        vec![store.to_string(), orders.to_string(), sales.to_string()]
    };
    RawTable {
        headers: vec![
            "Loja".to_string(),
            "Pedidos Válidos".to_string(),
            "Vendas Válidas (R$)".to_string(),
        ],
        rows: vec![
            row("MELI Centro", "12", "R$ 1.200,00"),
            row("SHOPEE Norte", "3", "R$ 310,50"),
            row("MELI Sul", "7", "R$ 2.483,65"),
            row("OUTRA Loja", "1", "R$ 99,90"),
            row("", "23", "R$ 4.094,05"),
        ],
    }
}

fn shift_month((year, month): (i32, u32), delta: i32) -> (i32, u32) {
    let index = year * 12 + (month as i32 - 1) + delta;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// The 42 cells of a month grid starting on Sunday, with whether each day
/// belongs to the month (the rest spill over from its neighbours).
fn month_cells((year, month): (i32, u32)) -> Vec<(NaiveDate, bool)> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };
    let lead = u64::from(first.weekday().num_days_from_sunday());
    let Some(start) = first.checked_sub_days(Days::new(lead)) else {
        return Vec::new();
    };
    (0..42)
        .filter_map(|i| start.checked_add_days(Days::new(i)))
        .map(|day| (day, day.month() == month))
        .collect()
}

/// Whether a day-cell selector leaves out the neighbouring months' days.
fn skips_spill_over(selector: &str, legacy: bool) -> bool {
    if legacy {
        selector.contains(":not(.ant-calendar-last-month-cell)")
            && selector.contains(":not(.ant-calendar-next-month-btn-day)")
    } else {
        selector.contains(".ant-picker-cell-in-view")
    }
}

fn title_attr(selector: &str) -> Option<&str> {
    let start = selector.find("title=\"")? + "title=\"".len();
    let len = selector[start..].find('"')?;
    Some(&selector[start..start + len])
}

impl FakeState {
    fn panels(&self) -> Vec<(i32, u32)> {
        match self.widget {
            Widget::Grid { shown, panels, .. } if self.panel_open => {
                (0..panels).map(|p| shift_month(shown, p as i32)).collect()
            }
            _ => Vec::new(),
        }
    }

    fn commit(&mut self) {
        self.panel_open = false;
        self.results_visible = true;
        self.committed_at = Some(Instant::now());
    }

    /// Whether the results of the committed filter have rendered.
    fn rendered(&self) -> bool {
        self.committed_at
            .is_some_and(|at| Instant::now() >= at + self.render_delay)
    }

    fn visible(&self, selector: &str) -> Vec<usize> {
        let one = |cond: bool| if cond { vec![0] } else { Vec::new() };
        let widget = &self.widget;

        // The page renders a single opener element, and only once the shell is up.
        if OPENER_SELECTORS.contains(&selector) {
            let opener = match widget {
                Widget::DualInput { legacy: true } | Widget::Grid { legacy: true, .. } => {
                    OPENER_SELECTORS[0]
                }
                Widget::Missing => return Vec::new(),
                _ => ".ant-picker-range",
            };
            return one(self.markers_present && selector == opener);
        }
        if INITIAL_MARKERS.contains(&selector) {
            return one(self.markers_present);
        }
        if RESULTS_MARKERS.contains(&selector) {
            return one(self.results_visible);
        }
        if selector == LOADING_MARKER {
            return one(self.spinner && self.committed_at.is_some() && !self.rendered());
        }
        if selector == PANEL_SELECTOR {
            return one(self.panel_open);
        }
        if !self.panel_open {
            return Vec::new();
        }
        if selector == MODERN_INPUT_SELECTORS[0] {
            return match widget {
                Widget::DualInput { legacy: false } => vec![0, 1],
                Widget::SingleInput => vec![0],
                _ => Vec::new(),
            };
        }
        if selector == LEGACY_INPUT_SELECTOR {
            return match widget {
                Widget::DualInput { legacy: true } => vec![0, 1],
                _ => Vec::new(),
            };
        }
        if selector == OK_BUTTON_SELECTOR {
            return one(matches!(widget, Widget::DualInput { .. }));
        }
        if selector == PREV_BUTTON || selector == NEXT_BUTTON {
            return one(matches!(widget, Widget::Grid { .. }));
        }
        if let Some(iso) = title_attr(selector) {
            let modern = matches!(widget, Widget::Grid { legacy: false, .. });
            let shown = self
                .panels()
                .iter()
                .any(|(y, m)| iso.starts_with(&format!("{:04}-{:02}-", y, m)));
            return one(modern && shown);
        }
        Vec::new()
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str) -> BrowserResult<()> {
        let delay = {
            let mut state = self.lock();
            state.url = url.to_string();
            state.log.push(format!("goto:{}", url));
            state.goto_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn ready_state(&self) -> BrowserResult<String> {
        let delay = self.lock().ready_state_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.lock().ready_states.pop_front() {
            Some(next) => next,
            None => Ok("complete".to_string()),
        }
    }

    async fn visible_indices(&self, selector: &str) -> BrowserResult<Vec<usize>> {
        Ok(self.lock().visible(selector))
    }

    async fn click(&self, selector: &str, index: usize) -> BrowserResult<()> {
        let mut state = self.lock();
        if !state.visible(selector).contains(&index) {
            return Err(BrowserError::NotInteractable(selector.to_string()));
        }

        if OPENER_SELECTORS.contains(&selector) {
            if state.destroy_on_open {
                state.destroy_on_open = false;
                state.log.push("opener:destroyed".to_string());
                return Err(BrowserError::ContextDestroyed(
                    "Execution context was destroyed".to_string(),
                ));
            }
            state.panel_open = true;
            state.log.push("opener".to_string());
        } else if selector == PREV_BUTTON || selector == NEXT_BUTTON {
            let delta = if selector == PREV_BUTTON { -1 } else { 1 };
            if let Widget::Grid { ref mut shown, .. } = state.widget {
                *shown = shift_month(*shown, delta);
            }
            state
                .log
                .push(if delta < 0 { "nav:prev" } else { "nav:next" }.to_string());
        } else if selector == OK_BUTTON_SELECTOR {
            state.commit();
            state.log.push("ok".to_string());
        } else if let Some(iso) = title_attr(selector) {
            let entry = format!("cell:{}", iso);
            state.log.push(entry);
            state.cell_clicks += 1;
            if state.cell_clicks == 2 {
                state.commit();
            }
        } else {
            state.log.push(format!("click:{}", selector));
        }
        Ok(())
    }

    async fn fill_text(&self, selector: &str, index: usize, text: &str) -> BrowserResult<()> {
        let mut state = self.lock();
        if state.typing_fails {
            return Err(BrowserError::NotInteractable(format!(
                "{} is not an HTMLElement",
                selector
            )));
        }
        if index >= state.inputs.len() {
            return Err(BrowserError::NotInteractable(selector.to_string()));
        }
        state.inputs[index] = text.to_string();
        state.log.push(format!("type:{}:{}", index, text));
        Ok(())
    }

    async fn set_value(&self, _selector: &str, index: usize, text: &str) -> BrowserResult<()> {
        let mut state = self.lock();
        if index >= state.inputs.len() {
            return Err(BrowserError::NotInteractable(format!("input {}", index)));
        }
        state.inputs[index] = text.to_string();
        state.log.push(format!("set:{}:{}", index, text));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> BrowserResult<()> {
        let mut state = self.lock();
        state.log.push(format!("key:{}", key));
        let filled = state.inputs.iter().all(|v| !v.is_empty());
        if key == "Enter"
            && state.panel_open
            && filled
            && matches!(state.widget, Widget::DualInput { legacy: false })
        {
            state.commit();
        }
        Ok(())
    }

    async fn texts(&self, selector: &str) -> BrowserResult<Vec<String>> {
        let state = self.lock();
        let legacy = matches!(state.widget, Widget::Grid { legacy: true, .. });
        let panels = state.panels();
        let texts = if selector == MODERN_HEADING && !legacy {
            panels
                .iter()
                .map(|(y, m)| format!("{}{}", MONTH_ABBR[*m as usize - 1], y))
                .collect()
        } else if selector == LEGACY_YEAR_SELECT && legacy {
            panels.iter().map(|(y, _)| format!("{}年", y)).collect()
        } else if selector == LEGACY_MONTH_SELECT && legacy {
            panels.iter().map(|(_, m)| format!("{}月", m)).collect()
        } else {
            Vec::new()
        };
        Ok(texts)
    }

    async fn click_text(&self, selector: &str, text: &str, nth: usize) -> BrowserResult<bool> {
        let mut state = self.lock();
        if selector != DAY_CELL_FALLBACK {
            return Ok(false);
        }
        let legacy = matches!(state.widget, Widget::Grid { legacy: true, .. });
        let skip_spill_over = skips_spill_over(selector, legacy);
        let hit = state
            .panels()
            .into_iter()
            .flat_map(month_cells)
            .filter(|(_, in_view)| *in_view || !skip_spill_over)
            .map(|(day, _)| day)
            .filter(|day| day.day().to_string() == text)
            .nth(nth);
        match hit {
            Some(day) => {
                state.log.push(format!("cell:{}", day.format("%Y-%m-%d")));
                state.cell_clicks += 1;
                if state.cell_clicks == 2 {
                    state.commit();
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn read_table(
        &self,
        selector: &str,
        max_rows: usize,
    ) -> BrowserResult<Option<RawTable>> {
        if selector != ".ant-table" {
            return Ok(None);
        }
        let state = self.lock();
        let current = match state.stale_table {
            Some(ref stale) if !state.rendered() => Some(stale.clone()),
            _ => state.table.clone(),
        };
        Ok(current.map(|mut t| {
            t.rows.truncate(max_rows);
            t
        }))
    }

    async fn label_values(&self, query: &CardQuery) -> BrowserResult<Vec<(String, String)>> {
        let state = self.lock();
        if !state.results_visible {
            return Ok(Vec::new());
        }
        Ok(match query.item {
            STATISTIC_ITEM => state.stats.clone(),
            CARD_TITLE_ITEM => state.card_titles.clone(),
            _ => Vec::new(),
        })
    }

    async fn block_text(&self, needle: &str) -> BrowserResult<Option<String>> {
        let state = self.lock();
        let needle = needle.to_lowercase();
        Ok(state
            .blocks
            .iter()
            .find(|block| state.results_visible && block.to_lowercase().contains(&needle))
            .cloned())
    }

    async fn content(&self) -> BrowserResult<String> {
        Ok("<html><head><title>UpSeller</title></head><body><div class=\"ant-table\"></div></body></html>".to_string())
    }

    async fn title(&self) -> BrowserResult<String> {
        Ok("UpSeller".to_string())
    }

    async fn url(&self) -> BrowserResult<String> {
        Ok(self.lock().url.clone())
    }

    async fn close(self: Box<Self>) -> BrowserResult<()> {
        self.record("page:close");
        if self.lock().failing_close {
            return Err(BrowserError::Protocol("Target closed".to_string()));
        }
        Ok(())
    }
}

/// Browser handed out by [`FakeConnector`]. Logs into the page's log.
pub(crate) struct FakeBrowser {
    page: FakePage,
    reuse_existing: bool,
}

#[async_trait]
impl RemoteBrowser for FakeBrowser {
    async fn open_context(&self) -> BrowserResult<ContextHandle> {
        if self.reuse_existing {
            self.page.record("context:shared");
            Ok(ContextHandle::Shared)
        } else {
            self.page.record("context:open");
            Ok(ContextHandle::Owned("ctx-1".to_string()))
        }
    }

    async fn add_cookies(
        &self,
        _context: &ContextHandle,
        cookies: &[SessionCookie],
    ) -> BrowserResult<()> {
        self.page.record(format!("cookies:{}", cookies.len()));
        Ok(())
    }

    async fn new_page(&self, _context: &ContextHandle) -> BrowserResult<Box<dyn PageDriver>> {
        self.page.record("page:new");
        Ok(Box::new(self.page.clone()))
    }

    async fn close_context(&self, context: ContextHandle) -> BrowserResult<()> {
        if let ContextHandle::Owned(_) = context {
            self.page.record("context:close");
            if self.page.lock().failing_close {
                return Err(BrowserError::Protocol("No browser context".to_string()));
            }
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> BrowserResult<()> {
        self.page.record("browser:close");
        Ok(())
    }
}

/// Connector that fails with scripted errors before handing out the page.
pub(crate) struct FakeConnector {
    page: FakePage,
    failures: Mutex<VecDeque<BrowserError>>,
    calls: Mutex<Vec<String>>,
    reuse_existing: bool,
}

impl FakeConnector {
    pub fn new(page: FakePage) -> Self {
        Self {
            page,
            failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            reuse_existing: false,
        }
    }

    pub fn with_failures(self, failures: Vec<BrowserError>) -> Self {
        *self.failures.lock().unwrap() = failures.into();
        self
    }

    pub fn reusing_existing_context(mut self) -> Self {
        self.reuse_existing = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserConnector for FakeConnector {
    async fn connect(&self, endpoint: &str) -> BrowserResult<Box<dyn RemoteBrowser>> {
        self.calls.lock().unwrap().push(endpoint.to_string());
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(Box::new(FakeBrowser {
            page: self.page.clone(),
            reuse_existing: self.reuse_existing,
        }))
    }
}
