//! Report assembly: the pure entry point from parsed rows to the two
//! reports handed to rendering and delivery.

use crate::aggregate::{aggregate, AggregatedTable};
use crate::classify::{partition, remaining_days, status_note, Candidate, ClassifiedRequest, Detail, UrgencyScale};
use crate::config::{RecipientConfig, ReportConfig, SystemConfig, PENDING_REPORT, REVOKED_REPORT};
use crate::grouping::resolve_groups;
use crate::owner::{resolve_pending_owner, resolve_revoked_owner};
use crate::recipients::{resolve_recipients, CategoryMatcher, ExactThenFuzzy};
use crate::record::{Field, RawRow};
use log::{debug, info};
use serde::Serialize;
use time::Date;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReportKind {
    PendingReview,
    Revoked,
}

impl ReportKind {
    pub fn title(self) -> &'static str {
        match self {
            ReportKind::PendingReview => PENDING_REPORT,
            ReportKind::Revoked => REVOKED_REPORT,
        }
    }

    pub fn subject(self, system: &SystemConfig) -> &str {
        match self {
            ReportKind::PendingReview => &system.email_subject_pending,
            ReportKind::Revoked => &system.email_subject_revoked,
        }
    }

    pub fn table_headers(self) -> [&'static str; 7] {
        match self {
            ReportKind::PendingReview => [
                "Action Owner",
                "Action Owner Email",
                "System Name",
                "Category",
                "剩余天数",
                "紧急程度",
                "Pending_review数量",
            ],
            ReportKind::Revoked => [
                "Action Owner",
                "Action Owner Email",
                "System Name",
                "Category",
                "Status",
                "状态说明",
                "Revoked数量",
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReportStatus {
    Ready,
    /// Nothing qualified; delivery should be skipped, not treated as a failure.
    NothingToReport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub kind: ReportKind,
    pub table: AggregatedTable,
    pub total_count: usize,
    pub recipients: Vec<String>,
    pub cc: Vec<String>,
    pub items: Vec<ClassifiedRequest>,
}

impl Report {
    pub fn build(
        kind: ReportKind,
        items: Vec<ClassifiedRequest>,
        addressing: &RecipientConfig,
        matcher: &dyn CategoryMatcher,
    ) -> Self {
        let table = aggregate(&items);
        let resolved = resolve_recipients(&items, addressing, matcher);
        Self {
            kind,
            total_count: table.total,
            table,
            recipients: resolved.recipients,
            cc: resolved.cc,
            items,
        }
    }

    pub fn report_type(&self) -> &'static str {
        self.kind.title()
    }

    pub fn status(&self) -> ReportStatus {
        if self.total_count == 0 {
            ReportStatus::NothingToReport
        } else {
            ReportStatus::Ready
        }
    }

    /// True when any item sits in the most urgent tier.
    pub fn is_urgent(&self, scale: &UrgencyScale) -> bool {
        match scale.most_urgent() {
            Some(tier) => self.items.iter().any(|i| i.urgency() == Some(tier.label.as_str())),
            None => false,
        }
    }

    pub fn rule_key(&self, scale: &UrgencyScale) -> &'static str {
        match self.kind {
            ReportKind::Revoked => "revoked_issues",
            ReportKind::PendingReview if self.is_urgent(scale) => "urgent_issues",
            ReportKind::PendingReview => "normal_issues",
        }
    }

    pub fn dated_subject(&self, system: &SystemConfig, today: Date) -> String {
        format!(
            "{} - {}年{}月{}日",
            self.kind.subject(system),
            today.year(),
            u8::from(today.month()),
            today.day()
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub pending: Report,
    pub revoked: Report,
}

impl Analysis {
    pub fn reports(&self) -> [&Report; 2] {
        [&self.pending, &self.revoked]
    }
}

fn text_of(row: &RawRow, field: Field) -> String {
    row.text(field).unwrap_or_default().to_string()
}

fn classify_pending(candidates: &[Candidate<'_>], today: Date, system: &SystemConfig) -> Vec<ClassifiedRequest> {
    let max_days = system.max_remaining_days_for_report;
    let scale = UrgencyScale::from_config(system);
    let mut items = Vec::with_capacity(candidates.len());
    for Candidate { group, head } in candidates {
        let days = remaining_days(head.datetime(Field::ExpirationDate), today, max_days);
        if days > max_days {
            debug!("Request {} expires in {} days; not reported", group.id, days);
            continue;
        }
        let urgency = scale.classify(days).map(|t| t.label.clone()).unwrap_or_default();
        let owner = resolve_pending_owner(&group.rows);
        items.push(ClassifiedRequest {
            group_id: group.id,
            owner: owner.name,
            owner_email: owner.email,
            system: text_of(head, Field::SystemSolution),
            category: text_of(head, Field::Category),
            site_tokens: head.site_tokens(),
            detail: Detail::Pending {
                remaining_days: days,
                urgency,
            },
            request_id: head.text(Field::RequestId).unwrap_or("N/A").to_string(),
        });
    }
    items
}

fn classify_revoked(candidates: &[Candidate<'_>], system: &SystemConfig) -> Vec<ClassifiedRequest> {
    candidates
        .iter()
        .map(|Candidate { group, head }| {
            let status = text_of(head, Field::Status);
            let owner = resolve_revoked_owner(&group.rows);
            ClassifiedRequest {
                group_id: group.id,
                owner: owner.name,
                owner_email: owner.email,
                system: text_of(head, Field::SystemSolution),
                category: text_of(head, Field::Category),
                site_tokens: head.site_tokens(),
                detail: Detail::Revoked {
                    status_note: status_note(&status, system),
                    status,
                },
                request_id: head.text(Field::RequestId).unwrap_or("N/A").to_string(),
            }
        })
        .collect()
}

/// Runs grouping, partition, classification, aggregation and addressing
/// over `rows`. `today` is the reference date for remaining-days arithmetic.
pub fn analyze(rows: Vec<RawRow>, today: Date, config: &ReportConfig) -> Analysis {
    let groups = resolve_groups(rows);
    let parts = partition(&groups);
    info!(
        "{} request groups: {} pending review, {} revoked",
        groups.len(),
        parts.pending.len(),
        parts.revoked.len()
    );

    let pending_items = classify_pending(&parts.pending, today, &config.system);
    let revoked_items = classify_revoked(&parts.revoked, &config.system);

    let pending_matcher = ExactThenFuzzy {
        strict: config.pending.strict_match,
    };
    let revoked_matcher = ExactThenFuzzy {
        strict: config.revoked.strict_match,
    };
    Analysis {
        pending: Report::build(ReportKind::PendingReview, pending_items, &config.pending, &pending_matcher),
        revoked: Report::build(ReportKind::Revoked, revoked_items, &config.revoked, &revoked_matcher),
    }
}
