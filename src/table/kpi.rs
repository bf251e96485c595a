//! Dashboard statistic cards.
//!
//! Best-effort: any failure reading the cards yields an empty map.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use super::{fold, parse_money};
use crate::browser::{CardQuery, PageDriver};

pub(crate) const STATISTIC_ITEM: &str = ".ant-statistic";
pub(crate) const CARD_TITLE_ITEM: &str = ".ant-card .ant-card-meta-title, .ant-card-head-title";

/// Card layouts, tried in order.
const CARD_SOURCES: &[CardQuery] = &[
    CardQuery {
        item: STATISTIC_ITEM,
        label: Some(".ant-statistic-title"),
        label_from_previous: true,
        value: ".ant-statistic-content, .ant-statistic-content-value",
        value_scope: 0,
    },
    // Card titles: the value sits in a sibling branch two levels up.
    CardQuery {
        item: CARD_TITLE_ITEM,
        label: None,
        label_from_previous: false,
        value: ".ant-statistic-content, .ant-typography, .ant-card-meta-description",
        value_scope: 2,
    },
];

/// Labels searched anywhere on the page when no card carries them.
const KNOWN_LABELS: &[&str] = &[
    "faturamento",
    "pedidos",
    "ticket",
    "ticket médio",
    "conversão",
    "itens por pedido",
];

fn number_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"R\$\s*\d[\d.,]*|-?\d{1,3}(?:\.\d{3})*(?:,\d+)?").expect("valid regex")
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiValue {
    pub raw: String,
    /// Parsed number, when the raw text has any digits.
    pub value: Option<f64>,
}

/// Key for a card label: accents stripped, punctuation removed,
/// whitespace collapsed, lowercase.
pub fn normalize_key(label: &str) -> String {
    fold(label)
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a card value with the table's money parser.
pub fn parse_value(raw: &str) -> Option<f64> {
    raw.chars()
        .any(|c| c.is_ascii_digit())
        .then(|| parse_money(raw))
}

/// Last pt-BR number (optionally with a currency prefix) in a text block.
pub fn last_number(text: &str) -> Option<String> {
    number_token()
        .find_iter(text)
        .last()
        .map(|m| m.as_str().trim().to_string())
}

fn insert(kpis: &mut BTreeMap<String, KpiValue>, label: &str, raw: &str) {
    let key = normalize_key(label);
    if key.is_empty() {
        return;
    }
    let raw = raw.trim().to_string();
    kpis.entry(key).or_insert_with(|| KpiValue {
        value: parse_value(&raw),
        raw,
    });
}

/// Read every KPI the page shows: statistic cards, card titles, then a
/// scan for known labels. The first source wins on key clashes.
pub async fn read_kpis(page: &dyn PageDriver) -> BTreeMap<String, KpiValue> {
    let mut kpis = BTreeMap::new();
    for query in CARD_SOURCES {
        match page.label_values(query).await {
            Ok(pairs) => {
                for (label, raw) in pairs {
                    insert(&mut kpis, &label, &raw);
                }
            }
            Err(e) => debug!(item = query.item, "Could not read KPI cards: {}", e),
        }
    }

    for label in KNOWN_LABELS {
        if kpis.contains_key(&normalize_key(label)) {
            continue;
        }
        match page.block_text(label).await {
            Ok(Some(block)) => {
                if let Some(raw) = last_number(&block) {
                    insert(&mut kpis, label, &raw);
                }
            }
            Ok(None) => {}
            Err(e) => debug!(label, "Could not scan for KPI label: {}", e),
        }
    }
    kpis
}
