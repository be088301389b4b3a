use crate::config::SystemConfig;
use crate::grouping::RequestGroup;
use crate::record::{Field, RawRow};
use serde::Serialize;
use time::{Date, PrimitiveDateTime};

pub const PENDING_STATUS: &str = "Pending Review";

/// Report-specific columns of a classified request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum Detail {
    Pending {
        #[serde(rename = "剩余天数")]
        remaining_days: i64,
        #[serde(rename = "紧急程度")]
        urgency: String,
    },
    Revoked {
        #[serde(rename = "Status")]
        status: String,
        #[serde(rename = "状态说明")]
        status_note: String,
    },
}

/// One request group after partitioning, owner resolution and tagging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedRequest {
    #[serde(skip)]
    pub group_id: usize,
    #[serde(rename = "Action Owner")]
    pub owner: String,
    #[serde(rename = "Action Owner Email")]
    pub owner_email: String,
    #[serde(rename = "System/Solution")]
    pub system: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "SiteTokens")]
    pub site_tokens: Vec<String>,
    #[serde(flatten)]
    pub detail: Detail,
    #[serde(rename = "Request ID")]
    pub request_id: String,
}

impl ClassifiedRequest {
    pub fn urgency(&self) -> Option<&str> {
        match &self.detail {
            Detail::Pending { urgency, .. } => Some(urgency),
            Detail::Revoked { .. } => None,
        }
    }
}

/// A group selected by the partition, with the line that matched.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub group: &'a RequestGroup,
    pub head: &'a RawRow,
}

#[derive(Debug, Default)]
pub struct Partition<'a> {
    pub pending: Vec<Candidate<'a>>,
    pub revoked: Vec<Candidate<'a>>,
}

fn identifies_request(row: &RawRow) -> bool {
    !row.is_blank(Field::SystemSolution) && !row.is_blank(Field::RequestFor) && !row.is_blank(Field::Category)
}

pub fn is_pending(row: &RawRow) -> bool {
    row.text(Field::Status) == Some(PENDING_STATUS) && identifies_request(row)
}

pub fn is_revoked(row: &RawRow) -> bool {
    row.text(Field::Status)
        .is_some_and(|s| s.to_lowercase().contains("revoked"))
        && identifies_request(row)
}

/// Splits groups by the status of their propagated lines. The first matching
/// line of a group stands for the whole request.
pub fn partition(groups: &[RequestGroup]) -> Partition<'_> {
    let mut out = Partition::default();
    for group in groups {
        if let Some(head) = group.propagated.iter().find(|r| is_pending(r)) {
            out.pending.push(Candidate { group, head });
        }
        if let Some(head) = group.propagated.iter().find(|r| is_revoked(r)) {
            out.revoked.push(Candidate { group, head });
        }
    }
    out
}

/// Whole days from `today` to the expiration date, floored at zero. A request
/// without an expiration date counts as `default_days` away.
pub fn remaining_days(expiration: Option<PrimitiveDateTime>, today: Date, default_days: i64) -> i64 {
    match expiration {
        Some(exp) => (exp.date() - today).whole_days().max(0),
        None => default_days,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrgencyTier {
    pub label: String,
    pub threshold_days: i64,
}

/// Tiers ordered by ascending threshold; the first tier whose threshold is
/// not exceeded wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrgencyScale {
    tiers: Vec<UrgencyTier>,
}

impl UrgencyScale {
    pub fn new<I, S>(levels: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut tiers: Vec<UrgencyTier> = levels
            .into_iter()
            .map(|(label, threshold_days)| UrgencyTier {
                label: label.into(),
                threshold_days,
            })
            .collect();
        tiers.sort_by_key(|t| t.threshold_days);
        Self { tiers }
    }

    pub fn from_config(system: &SystemConfig) -> Self {
        Self::new(system.urgency_levels.iter().map(|(k, v)| (k.clone(), *v)))
    }

    pub fn tiers(&self) -> &[UrgencyTier] {
        &self.tiers
    }

    pub fn most_urgent(&self) -> Option<&UrgencyTier> {
        self.tiers.first()
    }

    /// Position of the tier for `remaining_days`; past the last threshold the
    /// least urgent tier applies.
    pub fn rank(&self, remaining_days: i64) -> Option<usize> {
        if self.tiers.is_empty() {
            return None;
        }
        Some(
            self.tiers
                .iter()
                .position(|t| remaining_days <= t.threshold_days)
                .unwrap_or(self.tiers.len() - 1),
        )
    }

    pub fn classify(&self, remaining_days: i64) -> Option<&UrgencyTier> {
        self.rank(remaining_days).map(|i| &self.tiers[i])
    }

    pub fn rank_of(&self, label: &str) -> Option<usize> {
        self.tiers.iter().position(|t| t.label == label)
    }
}

pub fn status_note(status: &str, system: &SystemConfig) -> String {
    let lowered = status.to_lowercase();
    if lowered.contains("exitform") {
        system.exit_form_note.clone()
    } else if lowered.contains("rolechange") {
        system.role_change_note.clone()
    } else {
        String::new()
    }
}
