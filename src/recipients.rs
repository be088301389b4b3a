//! Who receives a report: the To list from configuration plus the owners
//! found in the data, the Cc list from configuration plus the site contacts
//! (`cc1`) whose keys match the reported categories.

use crate::classify::ClassifiedRequest;
use crate::config::RecipientConfig;
use crate::owner::normalize_email;
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub type ContactMap = BTreeMap<String, Vec<String>>;

/// Selects the `cc1` keys that apply to one identifier.
pub trait CategoryMatcher {
    fn matching_keys<'a>(&self, identifier: &str, contacts: &'a ContactMap) -> Vec<&'a str>;
}

/// Exact key first; failing that, and unless `strict`, every key that
/// contains the identifier or is contained in it, ignoring case.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactThenFuzzy {
    pub strict: bool,
}

impl CategoryMatcher for ExactThenFuzzy {
    fn matching_keys<'a>(&self, identifier: &str, contacts: &'a ContactMap) -> Vec<&'a str> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Vec::new();
        }
        if let Some((key, _)) = contacts.get_key_value(identifier) {
            return vec![key.as_str()];
        }
        if self.strict {
            return Vec::new();
        }
        let wanted = identifier.to_uppercase();
        contacts
            .keys()
            .filter(|key| {
                let key = key.trim().to_uppercase();
                !key.is_empty() && (key.contains(&wanted) || wanted.contains(&key))
            })
            .map(String::as_str)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationRecipients {
    pub recipients: Vec<String>,
    pub cc: Vec<String>,
}

fn normalized_set<'a>(emails: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    emails
        .into_iter()
        .map(normalize_email)
        .filter(|e| !e.is_empty())
        .collect()
}

/// Identifiers a request is matched on: its category, then its site tokens.
fn identifiers(item: &ClassifiedRequest) -> impl Iterator<Item = &str> {
    std::iter::once(item.category.as_str()).chain(item.site_tokens.iter().map(String::as_str))
}

pub fn resolve_recipients(
    items: &[ClassifiedRequest],
    config: &RecipientConfig,
    matcher: &dyn CategoryMatcher,
) -> NotificationRecipients {
    let recipients = normalized_set(
        config
            .recipients
            .iter()
            .map(String::as_str)
            .chain(items.iter().map(|i| i.owner_email.as_str())),
    );

    let mut matched_keys: BTreeSet<&str> = BTreeSet::new();
    for item in items {
        for identifier in identifiers(item) {
            matched_keys.extend(matcher.matching_keys(identifier, &config.cc1));
        }
    }
    debug!("cc1 keys matched: {:?}", matched_keys);

    let site_contacts = matched_keys
        .iter()
        .filter_map(|key| config.cc1.get(*key))
        .flatten()
        .map(String::as_str);
    let addressed: BTreeSet<String> = recipients.iter().map(|e| e.to_lowercase()).collect();
    let cc = normalized_set(config.cc.iter().map(String::as_str).chain(site_contacts))
        .into_iter()
        .filter(|e| !addressed.contains(&e.to_lowercase()))
        .collect();

    NotificationRecipients {
        recipients: recipients.into_iter().collect(),
        cc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Detail;

    fn contacts() -> ContactMap {
        let mut map = ContactMap::new();
        map.insert("CN01".to_string(), vec!["cn01.lead@pg.com".to_string()]);
        map.insert("Guangzhou".to_string(), vec!["gz@corp.cn".to_string(), "".to_string()]);
        map.insert("SH".to_string(), vec!["alice@pg.com".to_string()]);
        map
    }

    fn item(owner_email: &str, category: &str, sites: &[&str]) -> ClassifiedRequest {
        ClassifiedRequest {
            group_id: 1,
            owner: "Owner".to_string(),
            owner_email: owner_email.to_string(),
            system: "SAP".to_string(),
            category: category.to_string(),
            site_tokens: sites.iter().map(|s| s.to_string()).collect(),
            detail: Detail::Revoked {
                status: "Revoked".to_string(),
                status_note: String::new(),
            },
            request_id: String::new(),
        }
    }

    #[test]
    fn exact_match_wins_over_fuzzy() {
        let map = contacts();
        let matcher = ExactThenFuzzy::default();
        assert_eq!(matcher.matching_keys("CN01", &map), vec!["CN01"]);
        assert_eq!(matcher.matching_keys("cn01-plant", &map), vec!["CN01"]);
        assert_eq!(matcher.matching_keys("GUANGZHOU DC", &map), vec!["Guangzhou"]);
        assert!(matcher.matching_keys("  ", &map).is_empty());
    }

    #[test]
    fn fuzzy_collects_every_matching_key() {
        let map = contacts();
        let keys = ExactThenFuzzy::default().matching_keys("SHCN01", &map);
        assert_eq!(keys, vec!["CN01", "SH"]);
    }

    #[test]
    fn strict_mode_disables_fuzzy() {
        let map = contacts();
        let matcher = ExactThenFuzzy { strict: true };
        assert_eq!(matcher.matching_keys("CN01", &map), vec!["CN01"]);
        assert!(matcher.matching_keys("cn01", &map).is_empty());
    }

    #[test]
    fn cc_excludes_recipients_and_blanks() {
        let config = RecipientConfig {
            recipients: vec!["boss".to_string()],
            cc: vec!["Boss@pg.com".to_string(), "audit@pg.com".to_string(), " ".to_string()],
            cc1: contacts(),
            strict_match: false,
        };
        let items = vec![
            item("alice@pg.com", "Plant", &["SH", "GUANGZHOU"]),
            item("", "CN01", &[]),
        ];
        let resolved = resolve_recipients(&items, &config, &ExactThenFuzzy::default());
        assert_eq!(resolved.recipients, vec!["alice@pg.com", "boss@pg.com"]);
        assert_eq!(resolved.cc, vec!["audit@pg.com", "cn01.lead@pg.com", "gz@pg.com"]);
    }

    #[test]
    fn recipients_and_cc_never_overlap() {
        let config = RecipientConfig {
            recipients: vec!["x@pg.com".to_string()],
            cc: vec!["x@gmail.com".to_string(), "y".to_string()],
            cc1: contacts(),
            strict_match: false,
        };
        let items = vec![item("y@pg.com", "SH", &["CN01"]), item("alice", "Other", &[])];
        let resolved = resolve_recipients(&items, &config, &ExactThenFuzzy::default());
        for email in &resolved.cc {
            assert!(!resolved.recipients.contains(email), "{email}");
        }
        assert!(resolved.cc.iter().chain(&resolved.recipients).all(|e| !e.is_empty()));
    }

    #[test]
    fn cc_exclusion_ignores_case() {
        let config = RecipientConfig {
            recipients: vec!["boss@pg.com".to_string()],
            cc: vec!["Boss@pg.com".to_string(), "BOSS@PG.COM".to_string(), "team@pg.com".to_string()],
            ..RecipientConfig::default()
        };
        let resolved = resolve_recipients(&[], &config, &ExactThenFuzzy::default());
        assert_eq!(resolved.recipients, vec!["boss@pg.com"]);
        assert_eq!(resolved.cc, vec!["team@pg.com"]);
    }

    #[test]
    fn no_items_keeps_configured_lists() {
        let config = RecipientConfig {
            recipients: vec!["lead@pg.com".to_string()],
            cc: vec!["audit@pg.com".to_string()],
            ..RecipientConfig::default()
        };
        let resolved = resolve_recipients(&[], &config, &ExactThenFuzzy::default());
        assert_eq!(resolved.recipients, vec!["lead@pg.com"]);
        assert_eq!(resolved.cc, vec!["audit@pg.com"]);
    }
}
