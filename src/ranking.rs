//! Store grouping and top-N ranking.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::table::ExtractedRow;

/// A named group of stores selected by name prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    pub name: String,
    pub prefix: String,
}

impl GroupSpec {
    /// Group named after its own prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            name: prefix.to_uppercase(),
            prefix,
        }
    }

    /// Case-insensitive prefix match on the store name.
    pub fn matches(&self, store: &str) -> bool {
        store
            .trim_start()
            .to_lowercase()
            .starts_with(&self.prefix.to_lowercase())
    }
}

/// Sums over the rows kept in a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct GroupTotals {
    pub orders: u64,
    pub sales: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ResultGroup {
    pub rows: Vec<ExtractedRow>,
    pub totals: GroupTotals,
}

/// Groups in configured order. Serializes as a JSON object that keeps
/// that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedGroups(pub Vec<(String, ResultGroup)>);

#[cfg(test)]
impl RankedGroups {
    pub fn get(&self, name: &str) -> Option<&ResultGroup> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, g)| g)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }
}

impl Serialize for RankedGroups {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, group) in &self.0 {
            map.serialize_entry(name, group)?;
        }
        map.end()
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rank one group: stable sort by sales descending, keep `top_n`, total
/// over the kept rows only.
pub fn rank_group(rows: &[ExtractedRow], group: &GroupSpec, top_n: usize) -> ResultGroup {
    let mut matched: Vec<ExtractedRow> = rows
        .iter()
        .filter(|row| group.matches(&row.store))
        .cloned()
        .collect();
    matched.sort_by(|a, b| b.sales.total_cmp(&a.sales));
    matched.truncate(top_n);

    let totals = GroupTotals {
        orders: matched.iter().map(|r| r.orders).sum(),
        sales: round_cents(matched.iter().map(|r| r.sales).sum()),
    };
    ResultGroup {
        rows: matched,
        totals,
    }
}

/// Rank every configured group. Rows matching no group are dropped; a row
/// may appear in several groups.
pub fn rank(rows: &[ExtractedRow], groups: &[GroupSpec], top_n: usize) -> RankedGroups {
    RankedGroups(
        groups
            .iter()
            .map(|group| (group.name.clone(), rank_group(rows, group, top_n)))
            .collect(),
    )
}
