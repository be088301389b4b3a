//! Run configuration, read once from the JSON config file and passed down
//! the pipeline by reference.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const PENDING_REPORT: &str = "Pending review任务提醒";
pub const REVOKED_REPORT: &str = "Revoked状态任务提醒";

const EXIT_FORM_NOTE: &str = "ExitForm:SSO的应用/加入域的系统或者没有Onekey系统权限就无法登录系统的，可以在1年内在系统里面移除并确认，否则24小时移除；换句话说，Onekey user的权限一定要求离职通知的24小时内移除";
const ROLE_CHANGE_NOTE: &str = "请在30天内移除并在ITC确认";
const SYSTEM_LINK: &str = "https://itc-tool.pg.com/ComplianceReport?siteId=193";

pub fn default_urgency_levels() -> BTreeMap<String, i64> {
    [("非常紧急", 2), ("紧急", 4), ("常规", 10)]
        .into_iter()
        .map(|(label, days)| (label.to_string(), days))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipientConfig {
    pub recipients: Vec<String>,
    pub cc: Vec<String>,
    /// Site or category key -> extra contacts copied on matching reports.
    pub cc1: BTreeMap<String, Vec<String>>,
    pub strict_match: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    #[serde(rename = "MAX_REMAINING_DAYS_FOR_REPORT")]
    pub max_remaining_days_for_report: i64,
    #[serde(rename = "URGENCY_LEVELS")]
    pub urgency_levels: BTreeMap<String, i64>,
    #[serde(rename = "ITC_REPORT_DIR_NAME")]
    pub itc_report_dir_name: String,
    #[serde(rename = "RAW_DATA_DIR_NAME")]
    pub raw_data_dir_name: String,
    #[serde(rename = "REMINDER_DIR_NAME")]
    pub reminder_dir_name: String,
    #[serde(rename = "EMAIL_SUBJECT_PENDING")]
    pub email_subject_pending: String,
    #[serde(rename = "EMAIL_SUBJECT_REVOKED")]
    pub email_subject_revoked: String,
    #[serde(rename = "EMAIL_ExitForm_REVOKED")]
    pub exit_form_note: String,
    #[serde(rename = "EMAIL_RoleChange_REVOKED")]
    pub role_change_note: String,
    #[serde(rename = "ITC_SYSTEM_LINK")]
    pub itc_system_link: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            max_remaining_days_for_report: 10,
            urgency_levels: default_urgency_levels(),
            itc_report_dir_name: "ITC report".to_string(),
            raw_data_dir_name: "RawData".to_string(),
            reminder_dir_name: "Reminder".to_string(),
            email_subject_pending: PENDING_REPORT.to_string(),
            email_subject_revoked: REVOKED_REPORT.to_string(),
            exit_form_note: EXIT_FORM_NOTE.to_string(),
            role_change_note: ROLE_CHANGE_NOTE.to_string(),
            itc_system_link: SYSTEM_LINK.to_string(),
        }
    }
}

// On-disk layout. Anything outside `reports` (a Teams section, say) is ignored.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    reports: BTreeMap<String, ReportSection>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ReportSection {
    #[serde(flatten)]
    addressing: RecipientConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system_config: Option<SystemConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportConfig {
    pub pending: RecipientConfig,
    pub revoked: RecipientConfig,
    /// Shared settings. Only the pending report's section carries them.
    pub system: SystemConfig,
}

impl ReportConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let mut file: ConfigFile = serde_json::from_str(text).context("Invalid report configuration JSON")?;
        let mut pending = file.reports.remove(PENDING_REPORT).unwrap_or_default();
        let revoked = file.reports.remove(REVOKED_REPORT).unwrap_or_default();

        let mut system = pending.system_config.take().unwrap_or_default();
        // Missing default tiers are restored only when the configured scale
        // uses the default labels; a scale with its own labels stands alone.
        let defaults = default_urgency_levels();
        if system.urgency_levels.keys().all(|label| defaults.contains_key(label)) {
            for (label, days) in defaults {
                system.urgency_levels.entry(label).or_insert(days);
            }
        }

        Ok(Self {
            pending: pending.addressing,
            revoked: revoked.addressing,
            system,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        let mut reports = BTreeMap::new();
        reports.insert(
            PENDING_REPORT.to_string(),
            ReportSection {
                addressing: self.pending.clone(),
                system_config: Some(self.system.clone()),
            },
        );
        reports.insert(
            REVOKED_REPORT.to_string(),
            ReportSection {
                addressing: self.revoked.clone(),
                system_config: None,
            },
        );
        serde_json::to_string_pretty(&ConfigFile { reports }).context("Failed to serialize report configuration")
    }

    /// Reads the config at `path`. A missing file is created with the
    /// defaults; an unreadable or invalid one is reported and replaced by
    /// the defaults for this run.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
            }
            fs::write(path, config.to_json()?)
                .with_context(|| format!("Failed to write default config: {}", path.display()))?;
            info!("Created default configuration at {}", path.display());
            return Ok(config);
        }

        let loaded = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))
            .and_then(|text| Self::from_json(&text));
        match loaded {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Err(e) => {
                warn!("{:#}. Falling back to default configuration.", e);
                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = ReportConfig::from_json("{}").unwrap();
        assert_eq!(config, ReportConfig::default());
        assert_eq!(config.system.max_remaining_days_for_report, 10);
        assert_eq!(config.system.urgency_levels.len(), 3);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let json = r#"{
            "reports": {
                "Pending review任务提醒": {
                    "recipients": ["lead@pg.com"],
                    "cc1": {"CN01": ["site@pg.com"]},
                    "system_config": {
                        "MAX_REMAINING_DAYS_FOR_REPORT": 7,
                        "URGENCY_LEVELS": {"非常紧急": 1},
                        "LOG_DIR_NAME": "Log"
                    }
                },
                "Revoked状态任务提醒": {"cc": ["audit@pg.com"], "strict_match": true}
            },
            "Teams": {"webhook_url": "https://example.invalid/hook"}
        }"#;
        let config = ReportConfig::from_json(json).unwrap();
        assert_eq!(config.pending.recipients, vec!["lead@pg.com"]);
        assert_eq!(config.pending.cc1["CN01"], vec!["site@pg.com"]);
        assert!(!config.pending.strict_match);
        assert!(config.revoked.strict_match);
        assert_eq!(config.revoked.cc, vec!["audit@pg.com"]);

        let system = &config.system;
        assert_eq!(system.max_remaining_days_for_report, 7);
        assert_eq!(system.urgency_levels["非常紧急"], 1);
        assert_eq!(system.urgency_levels["紧急"], 4);
        assert_eq!(system.urgency_levels["常规"], 10);
        assert_eq!(system.role_change_note, ROLE_CHANGE_NOTE);
    }

    #[test]
    fn custom_tier_labels_replace_the_default_scale() {
        let json = r#"{"reports": {"Pending review任务提醒": {"system_config": {
            "URGENCY_LEVELS": {"critical": 1, "urgent": 3, "normal": 7}
        }}}}"#;
        let config = ReportConfig::from_json(json).unwrap();
        let scale = crate::classify::UrgencyScale::from_config(&config.system);
        let labels: Vec<&str> = scale.tiers().iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["critical", "urgent", "normal"]);
        assert_eq!(scale.classify(2).unwrap().label, "urgent");
        assert_eq!(scale.classify(4).unwrap().label, "normal");
        assert_eq!(scale.classify(8).unwrap().label, "normal");
    }

    #[test]
    fn empty_tier_map_falls_back_to_defaults() {
        let json = r#"{"reports": {"Pending review任务提醒": {"system_config": {"URGENCY_LEVELS": {}}}}}"#;
        let config = ReportConfig::from_json(json).unwrap();
        assert_eq!(config.system.urgency_levels, default_urgency_levels());
    }

    #[test]
    fn round_trips_through_json() {
        let mut config = ReportConfig::default();
        config.revoked.recipients.push("owner@pg.com".to_string());
        config.system.reminder_dir_name = "Out".to_string();
        let back = ReportConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("email_config.json");
        let config = ReportConfig::load_or_init(&path).unwrap();
        assert_eq!(config, ReportConfig::default());
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains(PENDING_REPORT));
        assert!(written.contains("MAX_REMAINING_DAYS_FOR_REPORT"));
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("email_config.json");
        fs::write(&path, r#"{"reports": {"Pending review任务提醒": {"recipients": 5}}}"#).unwrap();
        let config = ReportConfig::load_or_init(&path).unwrap();
        assert_eq!(config, ReportConfig::default());
    }
}
