use crate::classify::{ClassifiedRequest, Detail};
use serde::Serialize;
use std::collections::BTreeMap;

pub const TOTAL_LABEL: &str = "总计";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedRow {
    #[serde(rename = "Action Owner")]
    pub owner: String,
    #[serde(rename = "Action Owner Email")]
    pub owner_email: String,
    #[serde(rename = "System Name")]
    pub system: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(flatten)]
    pub detail: Detail,
    pub count: usize,
}

impl AggregatedRow {
    pub fn cells(&self) -> Vec<String> {
        let (first, second) = match &self.detail {
            Detail::Pending {
                remaining_days,
                urgency,
            } => (remaining_days.to_string(), urgency.clone()),
            Detail::Revoked { status, status_note } => (status.clone(), status_note.clone()),
        };
        vec![
            self.owner.clone(),
            self.owner_email.clone(),
            self.system.clone(),
            self.category.clone(),
            first,
            second,
            self.count.to_string(),
        ]
    }
}

/// Per-owner counts of one report. The grand total is held apart from the
/// rows so it can never be counted as one of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedTable {
    pub rows: Vec<AggregatedRow>,
    pub total: usize,
}

impl AggregatedTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_cells(&self) -> Vec<String> {
        let mut cells = vec![String::new(); 7];
        cells[0] = TOTAL_LABEL.to_string();
        cells[6] = self.total.to_string();
        cells
    }

    /// All rows as cell values, total row last.
    pub fn records(&self) -> Vec<Vec<String>> {
        let mut out: Vec<Vec<String>> = self.rows.iter().map(AggregatedRow::cells).collect();
        out.push(self.total_cells());
        out
    }
}

type GroupKey = (String, String, String, String, Detail);

/// Counts requests per (owner, email, system, category, detail). Rows come
/// out sorted by that key.
pub fn aggregate(items: &[ClassifiedRequest]) -> AggregatedTable {
    let mut counts: BTreeMap<GroupKey, usize> = BTreeMap::new();
    for item in items {
        let key = (
            item.owner.clone(),
            item.owner_email.clone(),
            item.system.clone(),
            item.category.clone(),
            item.detail.clone(),
        );
        *counts.entry(key).or_insert(0) += 1;
    }

    let rows: Vec<AggregatedRow> = counts
        .into_iter()
        .map(|((owner, owner_email, system, category, detail), count)| AggregatedRow {
            owner,
            owner_email,
            system,
            category,
            detail,
            count,
        })
        .collect();
    let total = rows.iter().map(|r| r.count).sum();
    AggregatedTable { rows, total }
}
