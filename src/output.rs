use crate::classify::ClassifiedRequest;
use crate::config::SystemConfig;
use crate::digest::render_digest;
use crate::report::{Analysis, Report};
use anyhow::{Context, Result};
use csv::Writer;
use log::info;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::{Date, PrimitiveDateTime};

/// `<report type>_<part>_<stamp>.<ext>`, spaces in the report type replaced.
pub fn output_file_name(report_type: &str, part: &str, stamp: &str, ext: &str) -> String {
    format!("{}_{}_{}.{}", report_type.replace(' ', "_"), part, stamp, ext)
}

pub fn run_stamp(now: PrimitiveDateTime) -> String {
    now.format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_else(|_| "00000000_000000".to_string())
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory: {}", dir.display()))
}

pub trait ReportSink {
    fn write_report(&mut self, report: &Report, today: Date) -> Result<PathBuf>;
    fn files_created(&self) -> usize;
}

pub struct TableCsvSink {
    dir: PathBuf,
    stamp: String,
    created: usize,
}

impl TableCsvSink {
    pub fn new<P: AsRef<Path>>(dir: P, stamp: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            stamp: stamp.to_string(),
            created: 0,
        }
    }
}

impl ReportSink for TableCsvSink {
    fn write_report(&mut self, report: &Report, _today: Date) -> Result<PathBuf> {
        ensure_dir(&self.dir)?;
        let path = self
            .dir
            .join(output_file_name(report.report_type(), "table", &self.stamp, "csv"));
        let file = File::create(&path).with_context(|| format!("Failed to create table file: {}", path.display()))?;

        let mut writer = Writer::from_writer(file);
        writer
            .write_record(report.kind.table_headers())
            .context("Failed to write table header")?;
        for record in report.table.records() {
            writer.write_record(&record)?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to flush table file: {}", path.display()))?;

        info!("Wrote {} table rows to {}", report.table.rows.len() + 1, path.display());
        self.created += 1;
        Ok(path)
    }

    fn files_created(&self) -> usize {
        self.created
    }
}

pub struct DigestSink {
    dir: PathBuf,
    stamp: String,
    system: SystemConfig,
    created: usize,
}

impl DigestSink {
    pub fn new<P: AsRef<Path>>(dir: P, stamp: &str, system: &SystemConfig) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            stamp: stamp.to_string(),
            system: system.clone(),
            created: 0,
        }
    }
}

impl ReportSink for DigestSink {
    fn write_report(&mut self, report: &Report, today: Date) -> Result<PathBuf> {
        ensure_dir(&self.dir)?;
        let path = self
            .dir
            .join(output_file_name(report.report_type(), "digest", &self.stamp, "md"));
        fs::write(&path, render_digest(report, &self.system, today))
            .with_context(|| format!("Failed to write digest: {}", path.display()))?;
        info!("Wrote digest to {}", path.display());
        self.created += 1;
        Ok(path)
    }

    fn files_created(&self) -> usize {
        self.created
    }
}

/// Contents of the run-results file read by whatever schedules the run.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RunSummary {
    Completed {
        pending_count: usize,
        revoked_count: usize,
        pending_review_items: Vec<ClassifiedRequest>,
        revoked_items: Vec<ClassifiedRequest>,
    },
    Failed {
        error: String,
    },
}

impl RunSummary {
    pub fn from_analysis(analysis: &Analysis) -> Self {
        RunSummary::Completed {
            pending_count: analysis.pending.total_count,
            revoked_count: analysis.revoked.total_count,
            pending_review_items: analysis.pending.items.clone(),
            revoked_items: analysis.revoked.items.clone(),
        }
    }

    pub fn failed(error: &anyhow::Error) -> Self {
        RunSummary::Failed {
            error: format!("{:#}", error),
        }
    }
}

pub fn write_results(path: &Path, summary: &RunSummary) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize run results")?;
    fs::write(path, json).with_context(|| format!("Failed to write run results: {}", path.display()))?;
    info!("Run results written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn file_names_replace_spaces() {
        assert_eq!(
            output_file_name("Pending review任务提醒", "table", "20240510_083000", "csv"),
            "Pending_review任务提醒_table_20240510_083000.csv"
        );
        assert_eq!(run_stamp(datetime!(2024-05-10 8:30:05)), "20240510_083005");
    }

    #[test]
    fn failed_summary_serializes_error_only() {
        let summary = RunSummary::failed(&anyhow::anyhow!("Report: missing required column 'Status'"));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json, serde_json::json!({"error": "Report: missing required column 'Status'"}));
    }
}
