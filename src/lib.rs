//! Daily store-sales KPI extraction from the UpSeller analytics dashboard.
//!
//! The dashboard has no API, so each invocation drives a remote headless
//! browser: inject session cookies, set the date filter to one day, wait
//! for the SPA to re-render, scrape the store table, then group and rank it.

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod period;
pub mod picker;
pub mod pipeline;
pub mod ranking;
pub mod readiness;
pub mod report;
pub mod server;
pub mod session;
pub mod table;

pub use error::{BrowserError, ExtractError, Result};
pub use pipeline::{InvocationRequest, KpiExtractor, Mode};
pub use report::Envelope;
