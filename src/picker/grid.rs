//! Calendar-grid positioning and day selection.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::browser::PageDriver;
use crate::error::{ExtractError, Result};
use crate::period::{days_in_month, Period};

pub(crate) const MODERN_HEADING: &str = ".ant-picker-dropdown .ant-picker-header-view";
pub(crate) const LEGACY_YEAR_SELECT: &str = ".ant-calendar-year-select";
pub(crate) const LEGACY_MONTH_SELECT: &str = ".ant-calendar-month-select";
pub(crate) const PREV_BUTTON: &str = ".ant-picker-header-prev-btn, .ant-calendar-prev-month-btn";
pub(crate) const NEXT_BUTTON: &str = ".ant-picker-header-next-btn, .ant-calendar-next-month-btn";
/// Days spilling over from the neighbouring months are excluded.
pub(crate) const DAY_CELL_FALLBACK: &str = concat!(
    ".ant-picker-cell-in-view .ant-picker-cell-inner, ",
    "td.ant-calendar-cell:not(.ant-calendar-last-month-cell)",
    ":not(.ant-calendar-next-month-btn-day) .ant-calendar-date, ",
    "[role=\"gridcell\"]:not(.ant-picker-cell):not(.ant-calendar-cell)"
);

/// Upper bound on prev/next clicks while looking for the target month.
pub const MAX_NAV_STEPS: u32 = 24;

const SETTLE: Duration = Duration::from_millis(150);

/// Cell whose `title` carries the ISO date.
pub(crate) fn day_cell_selector(iso: &str) -> String {
    format!("td.ant-picker-cell[title=\"{}\"] .ant-picker-cell-inner", iso)
}

/// A month shown by one calendar panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelMonth {
    pub year: i32,
    pub month: u32,
}

impl PanelMonth {
    pub fn index(&self) -> i32 {
        self.year * 12 + self.month as i32
    }
}

fn cjk_heading() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})\s*年\s*(\d{1,2})\s*月").expect("valid regex"))
}

fn numeric_heading() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})\s*[-/.]\s*(\d{1,2})").expect("valid regex"))
}

fn year_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})").expect("valid regex"))
}

/// Month number from a localized month name or abbreviation
/// (English, Portuguese, Spanish), or from a bare number like `3` or `3月`.
pub fn parse_month_token(token: &str) -> Option<u32> {
    let trimmed = token.trim().trim_end_matches('月').trim();
    if let Ok(n) = trimmed.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }

    let lower = trimmed.to_lowercase();
    lower
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| w.chars().count() >= 3)
        .find_map(|word| {
            let prefix: String = crate::table::fold(word).chars().take(3).collect();
            month_from_prefix(&prefix)
        })
}

fn month_from_prefix(prefix: &str) -> Option<u32> {
    let month = match prefix {
        "jan" | "ene" => 1,
        "feb" | "fev" => 2,
        "mar" => 3,
        "apr" | "abr" => 4,
        "may" | "mai" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" | "ago" => 8,
        "sep" | "set" => 9,
        "oct" | "out" => 10,
        "nov" => 11,
        "dec" | "dez" | "dic" => 12,
        _ => return None,
    };
    Some(month)
}

/// Parse a modern panel heading: `2025年3月`, `Mar 2025`, `março de 2025`,
/// `2025-03`.
pub fn parse_heading(text: &str) -> Option<PanelMonth> {
    if let Some(caps) = cjk_heading().captures(text) {
        return panel(&caps[1], &caps[2]);
    }
    if let Some(caps) = numeric_heading().captures(text) {
        return panel(&caps[1], &caps[2]);
    }
    let year: i32 = year_token().captures(text)?[1].parse().ok()?;
    let words = year_token().replace_all(text, " ");
    let month = parse_month_token(&words)?;
    Some(PanelMonth { year, month })
}

fn panel(year: &str, month: &str) -> Option<PanelMonth> {
    let year = year.parse().ok()?;
    let month = month.parse().ok()?;
    (1..=12)
        .contains(&month)
        .then_some(PanelMonth { year, month })
}

/// Read the months of every visible panel, modern headings first, then the
/// legacy split year/month selects.
pub async fn read_panels(page: &dyn PageDriver) -> Result<Vec<PanelMonth>> {
    let modern: Vec<PanelMonth> = page
        .texts(MODERN_HEADING)
        .await?
        .iter()
        .filter_map(|t| parse_heading(t))
        .collect();
    if !modern.is_empty() {
        return Ok(modern);
    }

    let years = page.texts(LEGACY_YEAR_SELECT).await?;
    let months = page.texts(LEGACY_MONTH_SELECT).await?;
    Ok(years
        .iter()
        .zip(months.iter())
        .filter_map(|(y, m)| {
            let year = year_token().captures(y)?[1].parse().ok()?;
            let month = parse_month_token(m)?;
            Some(PanelMonth { year, month })
        })
        .collect())
}

/// Where the target month ended up after navigation.
#[derive(Debug, Clone)]
pub struct Positioned {
    pub panels: Vec<PanelMonth>,
    pub panel_index: usize,
    pub steps: u32,
}

/// Click prev/next until a panel shows the target month.
pub async fn navigate_to_month(page: &dyn PageDriver, period: &Period) -> Result<Positioned> {
    let target = PanelMonth {
        year: period.year,
        month: period.month,
    };
    let target_label = format!("{:02}/{}", target.month, target.year);
    let mut steps = 0u32;

    loop {
        let panels = read_panels(page).await?;
        if panels.is_empty() {
            debug!("Calendar headings unreadable");
            return Err(ExtractError::NavigationExhausted {
                steps,
                target: target_label,
            });
        }

        if let Some(panel_index) = panels.iter().position(|p| *p == target) {
            debug!(steps, panel_index, "Target month visible");
            return Ok(Positioned {
                panels,
                panel_index,
                steps,
            });
        }

        if steps >= MAX_NAV_STEPS {
            return Err(ExtractError::NavigationExhausted {
                steps,
                target: target_label,
            });
        }

        let first = panels[0].index();
        let button = if target.index() < first {
            PREV_BUTTON
        } else {
            NEXT_BUTTON
        };
        page.click(button, 0).await?;
        steps += 1;
        tokio::time::sleep(SETTLE).await;
    }
}

/// Click the target day twice: range start and range end on the same cell.
pub async fn click_day(page: &dyn PageDriver, period: &Period, positioned: &Positioned) -> Result<()> {
    let not_found = || ExtractError::DayNotFound {
        day: period.day,
        month: period.month,
        year: period.year,
    };
    if period.as_date().is_none() {
        return Err(not_found());
    }

    let titled = day_cell_selector(&period.iso());
    if page.is_visible(&titled).await? {
        for _ in 0..2 {
            // The grid re-renders after the first click; look it up again.
            let visible = page.visible_indices(&titled).await?;
            let index = *visible.first().ok_or_else(not_found)?;
            page.click(&titled, index).await?;
            tokio::time::sleep(SETTLE).await;
        }
        return Ok(());
    }

    // Earlier panels whose month reaches this day contribute one in-view
    // occurrence each.
    let nth = positioned.panels[..positioned.panel_index]
        .iter()
        .filter(|p| days_in_month(p.year, p.month) >= period.day)
        .count();
    let text = period.day.to_string();
    for _ in 0..2 {
        if !page.click_text(DAY_CELL_FALLBACK, &text, nth).await? {
            return Err(not_found());
        }
        tokio::time::sleep(SETTLE).await;
    }
    Ok(())
}
