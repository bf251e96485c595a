//! Error types for the extraction pipeline.
//!
//! [`BrowserError`] is what a browser driver reports. [`ExtractError`] is the
//! taxonomy an invocation can end with; every variant is rendered into the
//! `{ok:false, error}` envelope by the pipeline boundary.

use thiserror::Error;

/// Errors raised by a browser driver (CDP or simulated).
#[derive(Debug, Clone, Error)]
pub enum BrowserError {
    /// The page swapped its document while a call was in flight.
    #[error("Execution context was destroyed: {0}")]
    ContextDestroyed(String),

    /// The element exists but cannot receive input (hidden, detached, zero-sized).
    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    /// A single browser action exceeded its explicit timeout.
    #[error("Browser action timed out after {timeout_ms}ms: {action}")]
    Timeout { action: String, timeout_ms: u64 },

    /// Opening the remote connection failed.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Any other protocol-level failure.
    #[error("Browser protocol error: {0}")]
    Protocol(String),
}

impl BrowserError {
    /// Classify a raw driver message into the matching variant.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("execution context was destroyed")
            || lower.contains("cannot find context with specified id")
            || lower.contains("context destroyed")
        {
            BrowserError::ContextDestroyed(message)
        } else if lower.contains("not visible")
            || lower.contains("not an htmlelement")
            || lower.contains("could not compute box model")
            || lower.contains("not interactable")
        {
            BrowserError::NotInteractable(message)
        } else {
            BrowserError::Protocol(message)
        }
    }

    /// True when the page replaced its DOM mid-call.
    pub fn is_context_destroyed(&self) -> bool {
        matches!(self, BrowserError::ContextDestroyed(_))
    }
}

/// Terminal errors of one extraction invocation.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Missing or malformed endpoint/cookie configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The d/m/y request parameters do not form a usable date.
    #[error("Invalid date parameters: {0} (use ?d=DD&m=MM&y=YYYY)")]
    InvalidPeriod(String),

    /// Every endpoint candidate used up its retries.
    #[error("Connection exhausted after {attempts} attempts: {last_error}")]
    ConnectionExhausted { attempts: u32, last_error: String },

    /// A readiness wait that must succeed timed out.
    #[error("Page never became ready ({step}) after {waited_ms}ms")]
    PageNotReady { step: String, waited_ms: u64 },

    /// No opener produced a visible picker panel.
    #[error("Date picker not found")]
    PickerNotFound,

    /// A dual-input panel was detected but two inputs could not be resolved.
    #[error("Date-range inputs not found (resolved {found} of 2)")]
    InputsNotFound { found: usize },

    /// The target day is not present in any visible calendar grid.
    #[error("Day {day} not found in calendar grid for {month:02}/{year}")]
    DayNotFound { day: u32, month: u32, year: i32 },

    /// Month navigation did not reach the target within its step bound.
    #[error("Calendar navigation exhausted after {steps} steps looking for {target}")]
    NavigationExhausted { steps: u32, target: String },

    /// The results table lacks one of the required columns.
    #[error("Required table columns not found: {missing:?} (headers: {headers:?})")]
    ColumnsNotFound {
        missing: Vec<String>,
        headers: Vec<String>,
    },

    /// The overall invocation deadline elapsed.
    #[error("Invocation deadline of {0}ms exceeded")]
    DeadlineExceeded(u64),

    /// Anything unanticipated from the browser layer.
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, ExtractError>;
