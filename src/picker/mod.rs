//! Date-range picker automation.
//!
//! Drives the dashboard's date filter to a single day. The selector walks
//! `Closed → Opening → Opened → [Positioning] → Filling → Applying →
//! Confirmed` and records every state it enters; any failure moves it to
//! `Aborted` with the trail preserved for diagnostics.

pub mod grid;
pub mod variant;

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::browser::PageDriver;
use crate::config::Timeouts;
use crate::error::{BrowserError, ExtractError, Result};
use crate::period::Period;
use crate::readiness::{self, ReadinessStep};

pub use variant::PickerVariant;
use variant::InputPair;

/// Elements that open the picker, modern and legacy class names first.
pub(crate) const OPENER_SELECTORS: &[&str] = &[
    ".ant-calendar-picker",
    ".ant-picker-range",
    ".ant-picker-input input",
    ".ant-picker",
    "[data-testid=\"date-picker\"]",
    "input[placeholder*=\"Data\"]",
    "button[aria-label*=\"Data\"]",
];

/// Any dropdown, panel or dialog the picker renders when open.
pub(crate) const PANEL_SELECTOR: &str =
    ".ant-picker-dropdown, .ant-picker-panel, .ant-calendar-picker-container, [role=\"dialog\"]";

pub(crate) const OK_BUTTON_SELECTOR: &str =
    ".ant-picker-dropdown .ant-picker-ok button, .ant-calendar-ok-btn";

const OPEN_ATTEMPTS: u32 = 2;
const FILL_PAUSE: Duration = Duration::from_millis(150);
const COMMIT_PAUSE: Duration = Duration::from_millis(400);
/// Time the dashboard gets to start re-rendering after a commit.
const APPLY_SETTLE: Duration = Duration::from_millis(1000);
const PANEL_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PickerState {
    Closed,
    Opening,
    Opened,
    Positioning,
    Filling,
    Applying,
    Confirmed,
    Aborted,
}

/// How a date value reached an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FillStrategy {
    /// Real key events.
    Typed,
    /// Native value setter plus synthetic `input`/`change` events.
    SetValue,
    /// Two clicks on a calendar cell.
    GridClick,
}

/// How the selection was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommitMethod {
    Enter,
    OkButton,
}

/// Summary of a successful selection, echoed in the response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickerOutcome {
    pub variant: PickerVariant,
    pub strategies: Vec<FillStrategy>,
    pub committed_by: CommitMethod,
    pub nav_steps: u32,
    pub trail: Vec<PickerState>,
}

/// State machine that applies one [`Period`] to the date filter.
pub struct DateRangeSelector<'a> {
    page: &'a dyn PageDriver,
    timeouts: &'a Timeouts,
    state: PickerState,
    trail: Vec<PickerState>,
}

impl<'a> DateRangeSelector<'a> {
    pub fn new(page: &'a dyn PageDriver, timeouts: &'a Timeouts) -> Self {
        Self {
            page,
            timeouts,
            state: PickerState::Closed,
            trail: vec![PickerState::Closed],
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> PickerState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn trail(&self) -> &[PickerState] {
        &self.trail
    }

    fn enter(&mut self, state: PickerState) {
        debug!(from = ?self.state, to = ?state, "Picker transition");
        self.state = state;
        self.trail.push(state);
    }

    /// Open the picker, fill both ends with `period` and commit.
    pub async fn apply(&mut self, period: &Period) -> Result<PickerOutcome> {
        match self.run(period).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.enter(PickerState::Aborted);
                warn!("Date picker aborted: {}", e);
                Err(e)
            }
        }
    }

    async fn run(&mut self, period: &Period) -> Result<PickerOutcome> {
        self.enter(PickerState::Opening);
        self.open().await?;
        self.enter(PickerState::Opened);

        let detected = variant::detect(self.page).await?;
        info!(variant = ?detected.variant, "Detected date picker");

        let mut nav_steps = 0;
        let strategies = match detected.inputs {
            Some(ref inputs) => {
                self.enter(PickerState::Filling);
                self.fill_inputs(inputs, &period.formatted()).await?
            }
            None => {
                self.enter(PickerState::Positioning);
                let positioned = grid::navigate_to_month(self.page, period).await?;
                nav_steps = positioned.steps;
                self.enter(PickerState::Filling);
                grid::click_day(self.page, period, &positioned).await?;
                vec![FillStrategy::GridClick]
            }
        };

        self.enter(PickerState::Applying);
        let committed_by = self.commit().await?;
        self.enter(PickerState::Confirmed);

        Ok(PickerOutcome {
            variant: detected.variant,
            strategies,
            committed_by,
            nav_steps,
            trail: self.trail.clone(),
        })
    }

    /// Run the opener sequence; a destroyed context resyncs and retries once.
    async fn open(&mut self) -> Result<()> {
        for attempt in 1..=OPEN_ATTEMPTS {
            match self.try_open().await {
                Ok(true) => return Ok(()),
                Ok(false) => break,
                Err(e) if e.is_context_destroyed() && attempt < OPEN_ATTEMPTS => {
                    debug!(attempt, "Context destroyed while opening picker; resyncing");
                    readiness::wait_until_ready(self.page, ReadinessStep::Document, self.timeouts)
                        .await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ExtractError::PickerNotFound)
    }

    async fn try_open(&self) -> std::result::Result<bool, BrowserError> {
        for opener in OPENER_SELECTORS {
            let Some(&index) = self.page.visible_indices(opener).await?.first() else {
                continue;
            };
            match self.page.click(opener, index).await {
                Ok(()) => {}
                Err(BrowserError::NotInteractable(_)) | Err(BrowserError::Timeout { .. }) => {
                    continue
                }
                Err(e) => return Err(e),
            }
            if self.panel_appears().await? {
                debug!(opener, "Date picker panel opened");
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn panel_appears(&self) -> std::result::Result<bool, BrowserError> {
        let deadline = Instant::now() + self.timeouts.panel_open;
        loop {
            if self.page.is_visible(PANEL_SELECTOR).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(PANEL_POLL).await;
        }
    }

    async fn fill_inputs(&self, inputs: &InputPair, value: &str) -> Result<Vec<FillStrategy>> {
        let mut strategies = Vec::with_capacity(2);
        for (i, index) in [inputs.start, inputs.end].into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(FILL_PAUSE).await;
            }
            let strategy = match self.page.fill_text(inputs.selector, index, value).await {
                Ok(()) => FillStrategy::Typed,
                Err(BrowserError::NotInteractable(reason)) => {
                    debug!(index, %reason, "Typing failed; setting value directly");
                    self.page.set_value(inputs.selector, index, value).await?;
                    FillStrategy::SetValue
                }
                Err(e) => return Err(e.into()),
            };
            strategies.push(strategy);
        }
        Ok(strategies)
    }

    /// Press Enter; fall back to the OK button if the panel stays open.
    /// Either way, give the results area time to start reloading.
    async fn commit(&self) -> Result<CommitMethod> {
        let method = self.press_commit().await?;
        tokio::time::sleep(APPLY_SETTLE).await;
        Ok(method)
    }

    async fn press_commit(&self) -> Result<CommitMethod> {
        self.page.press_key("Enter").await?;
        tokio::time::sleep(COMMIT_PAUSE).await;

        if !self.page.is_visible(PANEL_SELECTOR).await? {
            return Ok(CommitMethod::Enter);
        }
        match self.page.visible_indices(OK_BUTTON_SELECTOR).await?.first() {
            Some(&index) => {
                self.page.click(OK_BUTTON_SELECTOR, index).await?;
                Ok(CommitMethod::OkButton)
            }
            None => Ok(CommitMethod::Enter),
        }
    }
}
