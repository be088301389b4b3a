//! Chat-style Markdown summary of a report.

use crate::aggregate::AggregatedRow;
use crate::classify::{Detail, UrgencyScale};
use crate::config::SystemConfig;
use crate::report::{Report, ReportKind};
use time::Date;

/// Detail lines shown before the remainder is summarised.
pub const DIGEST_DETAIL_LIMIT: usize = 5;

const REVOKED_MARKER: &str = "⚠️";

fn tier_marker(rank: usize, tier_count: usize) -> &'static str {
    if rank == 0 {
        "🔴"
    } else if rank + 1 >= tier_count {
        "🟢"
    } else {
        "🟠"
    }
}

fn row_marker(row: &AggregatedRow, scale: &UrgencyScale) -> &'static str {
    match &row.detail {
        Detail::Pending { urgency, .. } => match scale.rank_of(urgency) {
            Some(rank) => tier_marker(rank, scale.tiers().len()),
            None => "🟢",
        },
        Detail::Revoked { .. } => REVOKED_MARKER,
    }
}

fn detail_line(row: &AggregatedRow, scale: &UrgencyScale) -> String {
    let last = match &row.detail {
        Detail::Pending { .. } => &row.category,
        Detail::Revoked { status, .. } => status,
    };
    format!(
        "{} {} | {} | {} ({}条)",
        row_marker(row, scale),
        row.owner,
        row.system,
        last,
        row.count
    )
}

fn detail_section(report: &Report, scale: &UrgencyScale) -> String {
    let rows = &report.table.rows;
    if rows.is_empty() {
        return "无明细".to_string();
    }
    let mut lines: Vec<String> = rows
        .iter()
        .take(DIGEST_DETAIL_LIMIT)
        .map(|r| detail_line(r, scale))
        .collect();
    if rows.len() > DIGEST_DETAIL_LIMIT {
        lines.push(format!("... 还有 {} 条", rows.len() - DIGEST_DETAIL_LIMIT));
    }
    lines.join("\n")
}

/// Count of aggregated rows per tier, most urgent first, empty tiers left out.
fn tier_section(report: &Report, scale: &UrgencyScale) -> String {
    let tiers = scale.tiers();
    let lines: Vec<String> = tiers
        .iter()
        .enumerate()
        .filter_map(|(rank, tier)| {
            let count = report
                .table
                .rows
                .iter()
                .filter(|r| matches!(&r.detail, Detail::Pending { urgency, .. } if *urgency == tier.label))
                .count();
            (count > 0).then(|| format!("{} **{}**: {} 条", tier_marker(rank, tiers.len()), tier.label, count))
        })
        .collect();
    if lines.is_empty() {
        "无紧急项".to_string()
    } else {
        lines.join("\n")
    }
}

pub fn render_digest(report: &Report, system: &SystemConfig, today: Date) -> String {
    let scale = UrgencyScale::from_config(system);
    let mut sections = vec![format!("### {}", report.dated_subject(system, today))];
    match report.kind {
        ReportKind::PendingReview => {
            sections.push(format!("**✅ 系统检测到当前有 {} 条待审核请求**", report.total_count));
            sections.push(format!("**紧急程度统计：**\n{}", tier_section(report, &scale)));
            sections.push(format!("**待审核摘要：**\n{}", detail_section(report, &scale)));
            sections.push("---".to_string());
            sections.push(format!(
                "请登录 [ITC 系统]({})，点击 **MyTasks / MyActions** 完成相关任务处理。",
                system.itc_system_link
            ));
        }
        ReportKind::Revoked => {
            sections.push(format!("**{} 当前 Revoked 总数：{}**", REVOKED_MARKER, report.total_count));
            sections.push(format!("**Revoked 摘要：**\n{}", detail_section(report, &scale)));
            sections.push("---".to_string());
            sections.push("请核查状态说明并在系统中完成权限确认与清理。".to_string());
            sections.push(format!("[查看 ITC 系统]({})", system.itc_system_link));
        }
    }
    let mut out = sections.join("\n\n");
    out.push('\n');
    out
}
