//! Picks the person responsible for a request from its audit log.

use crate::record::{Field, RawRow};
use log::{debug, warn};
use serde::Serialize;

pub const ORG_EMAIL_DOMAIN: &str = "@pg.com";
pub const UNKNOWN_ACTOR: &str = "未知";
pub const UNKNOWN_REQUESTER: &str = "未知请求者";

const APPROVAL_STATUSES: [&str; 2] = ["Approved", "PartiallyApproved"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OwnerSource {
    Approver,
    Confirmer,
    LatestLogEntry,
    Requester,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOwner {
    pub name: String,
    pub email: String,
    pub source: OwnerSource,
}

/// Forces [`ORG_EMAIL_DOMAIN`]. A blank address is rebuilt from `username`
/// ("Jane Doe" -> "jane.doe@pg.com").
pub fn ensure_pg_email(email: Option<&str>, username: Option<&str>) -> String {
    let email = email.map(str::trim).unwrap_or_default();
    if email.is_empty() {
        return match username.map(str::trim).filter(|u| !u.is_empty()) {
            Some(user) => format!("{}{}", user.to_lowercase().replace(' ', "."), ORG_EMAIL_DOMAIN),
            None => String::new(),
        };
    }
    if !email.contains('@') {
        return format!("{}{}", email.to_lowercase(), ORG_EMAIL_DOMAIN);
    }
    if !email.to_lowercase().ends_with(ORG_EMAIL_DOMAIN) {
        let local = email.split('@').next().unwrap_or_default();
        return format!("{}{}", local, ORG_EMAIL_DOMAIN);
    }
    email.to_string()
}

pub fn normalize_email(email: &str) -> String {
    ensure_pg_email(Some(email), None)
}

/// Latest `Log Date` among `rows`. Undated rows sort lowest and ties keep
/// the earliest row.
fn latest<'a>(rows: impl IntoIterator<Item = &'a RawRow>) -> Option<&'a RawRow> {
    let mut best: Option<&RawRow> = None;
    for row in rows {
        match best {
            Some(current) if row.datetime(Field::LogDate) <= current.datetime(Field::LogDate) => {}
            _ => best = Some(row),
        }
    }
    best
}

fn from_log_entry(row: &RawRow, source: OwnerSource) -> ActionOwner {
    let actor = row.text(Field::LogActor);
    ActionOwner {
        name: actor.unwrap_or(UNKNOWN_ACTOR).to_string(),
        email: ensure_pg_email(row.text(Field::LogActorEmail), actor),
        source,
    }
}

fn from_requester(rows: &[RawRow]) -> ActionOwner {
    let requester = rows.iter().find_map(|r| r.text(Field::Requester));
    let requester_email = rows.iter().find_map(|r| r.text(Field::RequesterEmail));
    match requester {
        Some(name) => ActionOwner {
            name: name.to_string(),
            email: ensure_pg_email(requester_email, Some(name)),
            source: OwnerSource::Requester,
        },
        None => {
            warn!(
                "No approver or requester for request starting at line {}; owner set to '{}'",
                rows.first().map_or(0, |r| r.line),
                UNKNOWN_REQUESTER
            );
            ActionOwner {
                name: UNKNOWN_REQUESTER.to_string(),
                email: ensure_pg_email(requester_email, None),
                source: OwnerSource::Unknown,
            }
        }
    }
}

/// Owner of a pending request: the latest approver, else the requester.
pub fn resolve_pending_owner(rows: &[RawRow]) -> ActionOwner {
    let approvals = rows
        .iter()
        .filter(|r| r.text(Field::LogStatus).is_some_and(|s| APPROVAL_STATUSES.contains(&s)));
    match latest(approvals) {
        Some(row) => {
            debug!("Line {}: pending owner from approval log", row.line);
            from_log_entry(row, OwnerSource::Approver)
        }
        None => from_requester(rows),
    }
}

/// Owner of a revoked request: the latest confirmer, else whoever logged
/// last, else the requester.
///
/// The middle step has no counterpart in [`resolve_pending_owner`].
pub fn resolve_revoked_owner(rows: &[RawRow]) -> ActionOwner {
    let confirmed = rows.iter().filter(|r| {
        r.text(Field::LogStatus)
            .is_some_and(|s| s.to_lowercase().contains("confirmed"))
    });
    if let Some(row) = latest(confirmed) {
        debug!("Line {}: revoked owner from confirmation log", row.line);
        return from_log_entry(row, OwnerSource::Confirmer);
    }
    let dated = rows.iter().filter(|r| r.datetime(Field::LogDate).is_some());
    if let Some(row) = latest(dated) {
        debug!("Line {}: revoked owner from latest log entry", row.line);
        return from_log_entry(row, OwnerSource::LatestLogEntry);
    }
    from_requester(rows)
}
