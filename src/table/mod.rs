//! Results table extraction and normalization.

pub mod kpi;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::browser::{BrowserResult, PageDriver, RawTable};
use crate::config::Timeouts;
use crate::error::{ExtractError, Result};
use crate::readiness::{ReadinessOutcome, ReadinessReport, ReadinessStep};

/// Candidate tables, most specific first.
pub(crate) const TABLE_SELECTORS: &[&str] = &[".ant-table", "table"];

/// Body rows read from the page.
pub const MAX_ROWS: usize = 500;

/// Raw rows echoed back for debugging.
pub const SAMPLE_ROWS: usize = 10;

const STORE_HEADERS: &[&str] = &["loja", "store", "shop", "tienda", "店铺", "店舗", "商店"];
const ORDER_HEADERS: &[&str] = &[
    "pedidos validos",
    "pedido valido",
    "valid order",
    "ordenes validas",
    "pedidos valid",
    "有效订单",
    "有效訂單",
];
const SALES_HEADERS: &[&str] = &[
    "vendas validas",
    "venda valida",
    "valid sales",
    "valid sale",
    "ventas validas",
    "有效销售额",
    "有效銷售額",
    "有效销售",
];

/// One normalized store row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedRow {
    pub store: String,
    pub orders: u64,
    pub sales: f64,
}

/// Header texts and the first raw rows of the scraped table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableSample {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Column positions of the fields we keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub store: usize,
    pub orders: usize,
    pub sales: usize,
}

/// Normalized rows plus the sample they came from.
#[derive(Debug, Clone)]
pub struct TableExtraction {
    pub rows: Vec<ExtractedRow>,
    pub sample: TableSample,
}

/// Lowercase and strip Latin diacritics.
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

fn find_column(headers: &[String], phrasings: &[&str], taken: &[usize]) -> Option<usize> {
    headers.iter().enumerate().find_map(|(i, header)| {
        if taken.contains(&i) {
            return None;
        }
        let folded = fold(header);
        phrasings
            .iter()
            .any(|p| folded.contains(p))
            .then_some(i)
    })
}

/// Resolve the store, valid-orders and valid-sales columns.
///
/// Orders and sales are resolved before the store column so a header like
/// "Vendas da loja" cannot be claimed as the store name.
pub fn resolve_columns(headers: &[String]) -> Result<ColumnMap> {
    let orders = find_column(headers, ORDER_HEADERS, &[]);
    let sales = find_column(headers, SALES_HEADERS, &orders.into_iter().collect::<Vec<_>>());
    let taken: Vec<usize> = orders.into_iter().chain(sales).collect();
    let store = find_column(headers, STORE_HEADERS, &taken);

    match (store, orders, sales) {
        (Some(store), Some(orders), Some(sales)) => Ok(ColumnMap {
            store,
            orders,
            sales,
        }),
        _ => {
            let missing = [("store", store), ("orders", orders), ("sales", sales)]
                .into_iter()
                .filter(|(_, col)| col.is_none())
                .map(|(name, _)| name.to_string())
                .collect();
            Err(ExtractError::ColumnsNotFound {
                missing,
                headers: headers.to_vec(),
            })
        }
    }
}

/// Keep only digits; empty yields zero.
pub fn parse_orders(text: &str) -> u64 {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

/// Parse a pt-BR money value: `R$ 1.234,56` → 1234.56, `-R$ 10,00` → -10.0.
///
/// Dots are thousands separators and the comma is the decimal mark.
/// Unparseable input yields zero.
pub fn parse_money(text: &str) -> f64 {
    let trimmed = text.trim();
    let negative = trimmed
        .chars()
        .take_while(|c| !c.is_ascii_digit())
        .any(|c| c == '-' || c == '−');

    let normalized: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    let value = normalized.parse::<f64>().unwrap_or(0.0);
    if negative {
        -value
    } else {
        value
    }
}

/// Turn raw rows into store rows, skipping rows without a store name and
/// rows too short to hold every column (empty-state placeholders).
pub fn normalize_rows(table: &RawTable, columns: &ColumnMap) -> Vec<ExtractedRow> {
    let cell = |row: &[String], i: usize| row.get(i).map(|s| s.trim()).unwrap_or_default().to_string();
    let width = columns.store.max(columns.orders).max(columns.sales) + 1;

    table
        .rows
        .iter()
        .filter_map(|row| {
            if row.len() < width {
                return None;
            }
            let store = cell(row, columns.store);
            if store.is_empty() {
                return None;
            }
            Some(ExtractedRow {
                store,
                orders: parse_orders(&cell(row, columns.orders)),
                sales: parse_money(&cell(row, columns.sales)),
            })
        })
        .collect()
}

async fn locate(page: &dyn PageDriver) -> BrowserResult<Option<RawTable>> {
    for selector in TABLE_SELECTORS {
        if let Some(found) = page.read_table(selector, MAX_ROWS).await? {
            debug!(selector, rows = found.rows.len(), "Found results table");
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// The table as currently rendered, if any. Read errors count as no table.
pub async fn snapshot(page: &dyn PageDriver) -> Option<RawTable> {
    locate(page).await.ok().flatten()
}

/// Wait until the table differs from `baseline`, the copy taken before the
/// filter was applied. Never fails: an unchanged table after the timeout
/// may simply mean the new day has the same numbers.
pub async fn wait_for_refresh(
    page: &dyn PageDriver,
    baseline: Option<&RawTable>,
    timeouts: &Timeouts,
) -> ReadinessReport {
    let step = ReadinessStep::Refresh;
    let started = Instant::now();
    let deadline = started + step.timeout(timeouts);

    let outcome = match baseline {
        None => ReadinessOutcome::Ready,
        Some(before) => loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Ok(Some(current)) = tokio::time::timeout(remaining, snapshot(page)).await {
                if &current != before {
                    break ReadinessOutcome::Ready;
                }
            }
            if Instant::now() >= deadline {
                debug!("Results table unchanged after applying the filter");
                break ReadinessOutcome::TimedOut;
            }
            tokio::time::sleep(timeouts.poll_interval).await;
        },
    };

    ReadinessReport {
        step,
        outcome,
        waited_ms: started.elapsed().as_millis() as u64,
        marker: None,
        resyncs: 0,
    }
}

/// Locate the results table and normalize it.
pub async fn extract(page: &dyn PageDriver) -> Result<TableExtraction> {
    let Some(table) = locate(page).await? else {
        return Err(ExtractError::ColumnsNotFound {
            missing: vec!["store".into(), "orders".into(), "sales".into()],
            headers: Vec::new(),
        });
    };

    let columns = resolve_columns(&table.headers)?;
    let rows = normalize_rows(&table, &columns);
    debug!(raw = table.rows.len(), kept = rows.len(), "Normalized table rows");

    Ok(TableExtraction {
        rows,
        sample: TableSample {
            headers: table.headers.clone(),
            rows: table.rows.iter().take(SAMPLE_ROWS).cloned().collect(),
        },
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::browser::fake::{sample_table, FakePage};

    fn headers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_money() {
        assert_eq!(parse_money("3.683,65"), 3683.65);
        assert_eq!(parse_money("0,00"), 0.0);
        assert_eq!(parse_money("1.234,56"), 1234.56);
        assert_eq!(parse_money("R$ 12,5"), 12.5);
        assert_eq!(parse_money("-R$ 10,00"), -10.0);
        assert_eq!(parse_money(""), 0.0);
        assert_eq!(parse_money("—"), 0.0);
    }

    #[test]
    fn test_parse_orders() {
        assert_eq!(parse_orders("1.204"), 1204);
        assert_eq!(parse_orders(" 7 "), 7);
        assert_eq!(parse_orders(""), 0);
    }

    #[test]
    fn test_fold() {
        assert_eq!(fold("Pedidos Válidos"), "pedidos validos");
        assert_eq!(fold("AÇÃO"), "acao");
    }

    #[test]
    fn test_resolve_columns_in_several_languages() {
        let pt = headers(&["Loja", "Pedidos Válidos", "Vendas Válidas (R$)"]);
        assert_eq!(
            resolve_columns(&pt).unwrap(),
            ColumnMap {
                store: 0,
                orders: 1,
                sales: 2
            }
        );

        let en = headers(&["Valid Sales", "Shop Name", "Valid Orders"]);
        assert_eq!(
            resolve_columns(&en).unwrap(),
            ColumnMap {
                store: 1,
                orders: 2,
                sales: 0
            }
        );

        let zh = headers(&["店铺", "有效订单数", "有效销售额"]);
        assert!(resolve_columns(&zh).is_ok());
    }

    #[test]
    fn test_missing_columns_are_listed() {
        let err = resolve_columns(&headers(&["Loja", "Pedidos Válidos"])).unwrap_err();
        match err {
            ExtractError::ColumnsNotFound { missing, headers } => {
                assert_eq!(missing, vec!["sales".to_string()]);
                assert_eq!(headers.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rows_without_store_are_skipped() {
        let table = sample_table();
        let columns = resolve_columns(&table.headers).unwrap();
        let rows = normalize_rows(&table, &columns);
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[0],
            ExtractedRow {
                store: "MELI Centro".to_string(),
                orders: 12,
                sales: 1200.0
            }
        );
    }

    #[test]
    fn test_placeholder_rows_are_skipped() {
        let mut table = sample_table();
        table.rows = vec![vec!["Sem dados".to_string()]];
        let columns = resolve_columns(&table.headers).unwrap();
        assert!(normalize_rows(&table, &columns).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_waits_for_new_table() {
        let page = FakePage::dual_input(false).with_stale_results(Duration::from_millis(900));
        let baseline = snapshot(&page).await;
        assert_eq!(baseline.as_ref().unwrap().rows[0][0], "MELI STALE");

        page.click(".ant-picker-range", 0).await.unwrap();
        page.fill_text(".", 0, "05/03/2025").await.unwrap();
        page.fill_text(".", 1, "05/03/2025").await.unwrap();
        page.press_key("Enter").await.unwrap();

        let report = wait_for_refresh(&page, baseline.as_ref(), &Timeouts::default()).await;
        assert!(report.is_ready());
        assert!(report.waited_ms >= 900);
        let extraction = extract(&page).await.unwrap();
        assert_eq!(extraction.rows[0].store, "MELI Centro");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_table_times_out_quietly() {
        let page = FakePage::dual_input(false);
        let baseline = snapshot(&page).await;
        let timeouts = Timeouts {
            refresh: Duration::from_secs(1),
            ..Default::default()
        };
        let report = wait_for_refresh(&page, baseline.as_ref(), &timeouts).await;
        assert_eq!(report.outcome, ReadinessOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_extract_from_page() {
        let page = FakePage::dual_input(false);
        let extraction = extract(&page).await.unwrap();
        assert_eq!(extraction.rows.len(), 4);
        assert_eq!(extraction.sample.rows.len(), 5);
        assert_eq!(extraction.sample.headers[0], "Loja");
    }

    #[tokio::test]
    async fn test_no_table_is_columns_not_found() {
        let page = FakePage::dual_input(false).with_table(None);
        let err = extract(&page).await.unwrap_err();
        assert!(matches!(err, ExtractError::ColumnsNotFound { .. }));
    }
}
