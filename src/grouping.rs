//! Turns the flat export into request groups.
//!
//! The export writes a request's own fields only on its first line; the lines
//! after it are audit-log entries for the same request. A line with a
//! non-blank `Requester` opens a new request.

use crate::record::{Cell, Field, RawRow};
use log::warn;

/// Request-scoped fields copied across every line of a group.
pub const PROPAGATED_FIELDS: [Field; 26] = [
    Field::Requester,
    Field::RequesterEmail,
    Field::RequestFor,
    Field::RequestForEmail,
    Field::RequestedDate,
    Field::Area,
    Field::Category,
    Field::CategoryDescription,
    Field::SystemSolution,
    Field::SystemSolutionDescription,
    Field::ApprovalText,
    Field::OwnerGuidelines,
    Field::ExpirationDate,
    Field::MaxRequestAge,
    Field::AccessType,
    Field::TemporaryAccess,
    Field::Privileged,
    Field::Status,
    Field::Confirmed,
    Field::Reason,
    Field::RemarkRole,
    Field::EmployeeStatus,
    Field::LogActor,
    Field::LogStatus,
    Field::LogDate,
    Field::RequestId,
];

/// Group id given to lines that precede the first `Requester`.
pub const ORPHAN_GROUP: usize = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct RequestGroup {
    pub id: usize,
    /// Lines as read. Owner resolution needs the per-line log values.
    pub rows: Vec<RawRow>,
    /// Copy of `rows` with [`PROPAGATED_FIELDS`] filled across the group.
    pub propagated: Vec<RawRow>,
}

impl RequestGroup {
    pub fn new(id: usize, rows: Vec<RawRow>) -> Self {
        let propagated = propagate(&rows);
        Self {
            id,
            rows,
            propagated,
        }
    }

    pub fn head(&self) -> Option<&RawRow> {
        self.propagated.first()
    }

    pub fn is_orphan(&self) -> bool {
        self.id == ORPHAN_GROUP
    }
}

/// Indices of the lines that open a new request.
pub fn group_starts(rows: &[RawRow]) -> Vec<usize> {
    rows.iter()
        .enumerate()
        .filter(|(_, row)| !row.is_blank(Field::Requester))
        .map(|(i, _)| i)
        .collect()
}

/// Group id of every line: the number of request openers at or above it.
pub fn group_ids(rows: &[RawRow]) -> Vec<usize> {
    let starts = group_starts(rows);
    (0..rows.len())
        .map(|i| starts.partition_point(|&s| s <= i))
        .collect()
}

/// Splits `rows` into consecutive request groups, in file order.
///
/// Lines before the first opener land in group [`ORPHAN_GROUP`].
pub fn resolve_groups(rows: Vec<RawRow>) -> Vec<RequestGroup> {
    let starts = group_starts(&rows);
    let total = rows.len();

    let mut spans: Vec<(usize, usize)> = Vec::with_capacity(starts.len() + 1);
    let first_start = starts.first().copied().unwrap_or(total);
    if first_start > 0 {
        warn!(
            "{} line(s) precede the first Requester; grouping them as request {}",
            first_start, ORPHAN_GROUP
        );
        spans.push((ORPHAN_GROUP, first_start));
    }
    for (k, &start) in starts.iter().enumerate() {
        let end = starts.get(k + 1).copied().unwrap_or(total);
        spans.push((k + 1, end - start));
    }

    let mut lines = rows.into_iter();
    spans
        .into_iter()
        .map(|(id, len)| RequestGroup::new(id, lines.by_ref().take(len).collect()))
        .collect()
}

/// Forward-fills then backward-fills each propagated field, within `rows` only.
pub fn propagate(rows: &[RawRow]) -> Vec<RawRow> {
    let mut filled = rows.to_vec();
    for field in PROPAGATED_FIELDS {
        let mut carried: Option<Cell> = None;
        for row in filled.iter_mut() {
            match row.get(field).cloned() {
                Some(cell) => carried = Some(cell),
                None => row.set(field, carried.clone()),
            }
        }
        let mut carried: Option<Cell> = None;
        for row in filled.iter_mut().rev() {
            match row.get(field).cloned() {
                Some(cell) => carried = Some(cell),
                None => row.set(field, carried.clone()),
            }
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(requester: &str, log_actor: &str) -> RawRow {
        RawRow::new(0)
            .with(Field::Requester, requester)
            .with(Field::LogActor, log_actor)
    }

    #[test]
    fn ids_are_cumulative_and_non_decreasing() {
        let rows = vec![
            line("", "x"),
            line("Alice", "a1"),
            line("", "a2"),
            line("Bob", "b1"),
            line("Carol", "c1"),
            line("", "c2"),
        ];
        let ids = group_ids(&rows);
        assert_eq!(ids, vec![0, 1, 1, 2, 3, 3]);
        assert!(ids.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn every_line_lands_in_exactly_one_group() {
        let rows = vec![
            line("", "x"),
            line("Alice", "a1"),
            line("", "a2"),
            line("Bob", "b1"),
        ];
        let ids = group_ids(&rows);
        let groups = resolve_groups(rows);
        assert_eq!(groups.iter().map(|g| g.rows.len()).sum::<usize>(), 4);
        assert_eq!(groups.iter().map(|g| g.id).collect::<Vec<_>>(), vec![0, 1, 2]);
        let flattened: Vec<usize> = groups
            .iter()
            .flat_map(|g| std::iter::repeat(g.id).take(g.rows.len()))
            .collect();
        assert_eq!(flattened, ids);
        assert!(groups[0].is_orphan());
    }

    #[test]
    fn no_orphan_group_when_export_starts_with_a_request() {
        let groups = resolve_groups(vec![line("Alice", "a1"), line("", "a2")]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, 1);
        assert!(resolve_groups(Vec::new()).is_empty());
    }

    #[test]
    fn propagation_fills_within_group_only() {
        let rows = vec![
            RawRow::new(2)
                .with(Field::Requester, "Alice")
                .with(Field::Status, "Pending Review")
                .with(Field::Category, "CN01"),
            RawRow::new(3).with(Field::LogActor, "Reviewer"),
            RawRow::new(4)
                .with(Field::Requester, "Bob")
                .with(Field::Status, "Approved"),
            RawRow::new(5),
        ];
        let groups = resolve_groups(rows);

        for group in &groups {
            for field in PROPAGATED_FIELDS {
                let first = group.propagated[0].get(field);
                assert!(group.propagated.iter().all(|r| r.get(field) == first));
            }
        }
        assert_eq!(groups[0].propagated[1].text(Field::Status), Some("Pending Review"));
        assert_eq!(groups[0].propagated[0].text(Field::LogActor), Some("Reviewer"));
        // Bob's request never had a category; Alice's must not leak into it.
        assert!(groups[1].propagated.iter().all(|r| r.is_blank(Field::Category)));
        assert!(groups[1].propagated.iter().all(|r| r.is_blank(Field::LogActor)));
    }

    #[test]
    fn raw_lines_keep_their_own_log_values() {
        let rows = vec![
            RawRow::new(2).with(Field::Requester, "Alice"),
            RawRow::new(3).with(Field::LogStatus, "Approved"),
            RawRow::new(4).with(Field::LogStatus, "Rejected"),
        ];
        let groups = resolve_groups(rows);
        let group = &groups[0];
        assert!(group.rows[0].is_blank(Field::LogStatus));
        assert_eq!(group.rows[2].text(Field::LogStatus), Some("Rejected"));
        // Filled copy carries the first/last occurrence only.
        assert_eq!(group.propagated[0].text(Field::LogStatus), Some("Approved"));
        assert_eq!(group.propagated[2].text(Field::LogStatus), Some("Rejected"));
    }

    #[test]
    fn log_actor_email_is_not_propagated() {
        let rows = vec![
            RawRow::new(2)
                .with(Field::Requester, "Alice")
                .with(Field::LogActorEmail, "r@pg.com"),
            RawRow::new(3),
        ];
        let groups = resolve_groups(rows);
        assert!(groups[0].propagated[1].is_blank(Field::LogActorEmail));
    }
}
