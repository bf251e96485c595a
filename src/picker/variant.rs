//! Picker variant detection.

use serde::Serialize;
use tracing::debug;

use crate::browser::PageDriver;
use crate::error::{ExtractError, Result};

/// Text inputs inside a modern (antd v4+) range panel, most specific first.
pub(crate) const MODERN_INPUT_SELECTORS: &[&str] = &[
    ".ant-picker-dropdown .ant-picker-input input",
    ".ant-picker-range .ant-picker-input input",
    ".ant-picker-dropdown input, .ant-picker-panel input",
];

/// Text inputs of the legacy (antd v3) range calendar.
pub(crate) const LEGACY_INPUT_SELECTOR: &str =
    ".ant-calendar-range-picker-input, .ant-calendar-input";

/// Date widget shapes the dashboard has shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PickerVariant {
    ModernDualInput,
    LegacyDualInput,
    CalendarGridOnly,
}

/// A detected variant and, for dual-input panels, the selector whose first
/// two visible matches are the start and end inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedVariant {
    pub variant: PickerVariant,
    pub inputs: Option<InputPair>,
}

/// Resolved start/end input positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPair {
    pub selector: &'static str,
    pub start: usize,
    pub end: usize,
}

/// Inspect the open panel for text inputs.
///
/// Two or more inputs select a dual-input strategy, none selects the grid,
/// and exactly one is an error: the panel is in a state we cannot fill.
pub async fn detect(page: &dyn PageDriver) -> Result<DetectedVariant> {
    let mut best_partial = 0usize;

    let families = MODERN_INPUT_SELECTORS
        .iter()
        .map(|s| (PickerVariant::ModernDualInput, *s))
        .chain(std::iter::once((
            PickerVariant::LegacyDualInput,
            LEGACY_INPUT_SELECTOR,
        )));

    for (variant, selector) in families {
        let visible = page.visible_indices(selector).await?;
        debug!(selector, count = visible.len(), "Inspected picker inputs");
        if visible.len() >= 2 {
            return Ok(DetectedVariant {
                variant,
                inputs: Some(InputPair {
                    selector,
                    start: visible[0],
                    end: visible[1],
                }),
            });
        }
        best_partial = best_partial.max(visible.len());
    }

    if best_partial == 1 {
        return Err(ExtractError::InputsNotFound { found: 1 });
    }

    Ok(DetectedVariant {
        variant: PickerVariant::CalendarGridOnly,
        inputs: None,
    })
}
