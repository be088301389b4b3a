use anyhow::{anyhow, Context, Result};
use clap::Parser;
use glob::{glob_with, MatchOptions, Pattern};
use itc_report_digest::classify::UrgencyScale;
use itc_report_digest::config::SystemConfig;
use itc_report_digest::loader::load_export;
use itc_report_digest::output::{run_stamp, write_results, DigestSink, ReportSink, RunSummary, TableCsvSink};
use itc_report_digest::{analyze, Analysis, ReportConfig, ReportStatus};
use log::{error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

#[derive(Parser)]
#[command(name = "ITC Report Digest")]
#[command(about = "Build pending-review and revoked-access reminders from an ITC compliance CSV export")]
#[command(version = "0.1.0")]
struct Cli {
    #[arg(short, long, help = "CSV export to process (default: newest CSV in the raw data directory)")]
    csv_path: Option<PathBuf>,

    #[arg(long, default_value = "email_config.json", help = "Report configuration JSON, relative to the base directory")]
    config: PathBuf,

    #[arg(short, long, default_value = ".", help = "Directory holding the report directory and the run results")]
    base_dir: PathBuf,

    #[arg(long, help = "Reference date as YYYY-MM-DD (default: today)")]
    today: Option<String>,

    #[arg(short, long, help = "Run results JSON (default: <base-dir>/a_results.json)")]
    results: Option<PathBuf>,

    #[arg(short, long, default_value = "INFO", help = "Logging level (DEBUG, INFO, WARN, ERROR)")]
    log_level: String,

    #[arg(long, help = "Match cc1 keys exactly, for both reports")]
    strict_match: bool,

    #[arg(long, help = "Report pending requests expiring within this many days")]
    max_days: Option<i64>,

    #[arg(long, help = "Log the files that would be written without writing them")]
    dry_run: bool,
}

struct RunOutcome {
    analysis: Analysis,
    config: ReportConfig,
    csv_path: PathBuf,
    today: Date,
    files_written: usize,
}

fn setup_logging(log_level_str: &str) -> Result<()> {
    let log_level = match log_level_str.to_uppercase().as_str() {
        "DEBUG" => LevelFilter::Debug,
        "INFO" => LevelFilter::Info,
        "WARN" | "WARNING" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        other => {
            eprintln!("Invalid log level '{}', defaulting to INFO.", other);
            LevelFilter::Info
        }
    };

    SimpleLogger::new()
        .with_level(log_level)
        .with_timestamp_format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .init()?;

    Ok(())
}

fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:03}s", seconds, elapsed.subsec_millis())
    }
}

fn local_now() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| {
        warn!("Local UTC offset unavailable; using UTC.");
        OffsetDateTime::now_utc()
    });
    PrimitiveDateTime::new(now.date(), now.time())
}

fn parse_today(raw: &str) -> Result<Date> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
        .with_context(|| format!("Invalid --today '{}', expected YYYY-MM-DD", raw))
}

fn apply_overrides(config: &mut ReportConfig, cli: &Cli) {
    if cli.strict_match {
        config.pending.strict_match = true;
        config.revoked.strict_match = true;
    }
    if let Some(days) = cli.max_days {
        info!("MAX_REMAINING_DAYS_FOR_REPORT overridden to {}", days);
        config.system.max_remaining_days_for_report = days;
    }
}

/// Creates the raw data and reminder directories; returns them in that order.
fn prepare_directories(base_dir: &Path, system: &SystemConfig) -> Result<(PathBuf, PathBuf)> {
    let report_dir = base_dir.join(&system.itc_report_dir_name);
    let raw_dir = report_dir.join(&system.raw_data_dir_name);
    let reminder_dir = report_dir.join(&system.reminder_dir_name);
    for dir in [&raw_dir, &reminder_dir] {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    info!("Report directory: {}", report_dir.display());
    Ok((raw_dir, reminder_dir))
}

fn find_newest_csv(raw_dir: &Path) -> Result<PathBuf> {
    let pattern = Path::new(&Pattern::escape(&raw_dir.to_string_lossy())).join("*.csv");
    let pattern_str = pattern.to_string_lossy();
    info!("Searching for exports matching: {}", pattern_str);
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };
    glob_with(&pattern_str, options)?
        .filter_map(Result::ok)
        .filter_map(|path| {
            let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
            Some((path, modified))
        })
        .max_by_key(|(_, modified)| *modified)
        .map(|(path, _)| path)
        .ok_or_else(|| anyhow!("No CSV export found in {}", raw_dir.display()))
}

fn select_csv(cli: &Cli, raw_dir: &Path) -> Result<PathBuf> {
    match &cli.csv_path {
        Some(path) if path.exists() => Ok(path.clone()),
        Some(path) => {
            warn!("CSV {} does not exist; using the newest export instead.", path.display());
            find_newest_csv(raw_dir)
        }
        None => find_newest_csv(raw_dir),
    }
}

fn write_reports(
    analysis: &Analysis,
    config: &ReportConfig,
    reminder_dir: &Path,
    today: Date,
    stamp: &str,
    dry_run: bool,
) -> Result<usize> {
    let scale = UrgencyScale::from_config(&config.system);
    let mut sinks: Vec<Box<dyn ReportSink>> = vec![
        Box::new(TableCsvSink::new(reminder_dir, stamp)),
        Box::new(DigestSink::new(reminder_dir, stamp, &config.system)),
    ];

    for report in analysis.reports() {
        if report.status() == ReportStatus::NothingToReport {
            info!("{}: nothing to report, skipping.", report.report_type());
            continue;
        }
        info!(
            "{}: {} requests, rule '{}', subject '{}'",
            report.report_type(),
            report.total_count,
            report.rule_key(&scale),
            report.dated_subject(&config.system, today)
        );
        if dry_run {
            info!("Dry run: not writing {} outputs to {}", report.report_type(), reminder_dir.display());
            continue;
        }
        for sink in sinks.iter_mut() {
            sink.write_report(report, today)?;
        }
    }

    Ok(sinks.iter().map(|s| s.files_created()).sum())
}

fn run(cli: &Cli) -> Result<RunOutcome> {
    let mut config = ReportConfig::load_or_init(&cli.base_dir.join(&cli.config))?;
    apply_overrides(&mut config, cli);
    let (raw_dir, reminder_dir) = prepare_directories(&cli.base_dir, &config.system)?;

    let now = local_now();
    let today = match &cli.today {
        Some(raw) => parse_today(raw)?,
        None => now.date(),
    };
    info!("Reference date: {}", today);

    let csv_path = select_csv(cli, &raw_dir)?;
    info!("Processing export: {}", csv_path.display());
    let export = load_export(&csv_path).with_context(|| format!("Failed to load {}", csv_path.display()))?;

    let analysis = analyze(export.rows, today, &config);
    info!(
        "Analysis complete: pending={} revoked={}",
        analysis.pending.total_count, analysis.revoked.total_count
    );

    let files_written = write_reports(&analysis, &config, &reminder_dir, today, &run_stamp(now), cli.dry_run)?;

    Ok(RunOutcome {
        analysis,
        config,
        csv_path,
        today,
        files_written,
    })
}

fn print_final_summary(start_time: Instant, outcome: &RunOutcome) {
    let scale = UrgencyScale::from_config(&outcome.config.system);
    info!("-------------------- FINAL SUMMARY --------------------");
    info!("Total execution time: {}", format_elapsed(start_time.elapsed()));
    info!("Input export: {}", outcome.csv_path.display());
    info!("Reference date: {}", outcome.today);
    for report in outcome.analysis.reports() {
        info!("{}: {:?}, {} requests", report.report_type(), report.status(), report.total_count);
        if report.status() == ReportStatus::Ready {
            info!("  Rule: {}", report.rule_key(&scale));
            info!("  Recipients: {}", report.recipients.join(", "));
            info!("  Cc: {}", if report.cc.is_empty() { "-".to_string() } else { report.cc.join(", ") });
        }
    }
    info!("Report files written: {}", outcome.files_written);
    info!("-------------------------------------------------------");
}

fn main() -> ExitCode {
    let start_time = Instant::now();
    let cli = Cli::parse();

    if let Err(e) = setup_logging(&cli.log_level) {
        eprintln!("Failed to initialise logging: {}", e);
        return ExitCode::FAILURE;
    }
    info!("Starting ITC report digest");

    let results_path = cli
        .results
        .clone()
        .unwrap_or_else(|| cli.base_dir.join("a_results.json"));

    let outcome = run(&cli);
    let summary = match &outcome {
        Ok(done) => RunSummary::from_analysis(&done.analysis),
        Err(e) => {
            error!("Report run failed: {:#}", e);
            RunSummary::failed(e)
        }
    };
    if let Err(e) = write_results(&results_path, &summary) {
        error!("{:#}", e);
    }

    match outcome {
        Ok(done) => {
            print_final_summary(start_time, &done);
            ExitCode::SUCCESS
        }
        Err(_) => ExitCode::FAILURE,
    }
}
