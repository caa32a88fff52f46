//! Record auditing
//!
//! Provider-independent checks run once per domain after lowering; the
//! capability audit runs once per (domain, provider) pair before planning.
//! Findings are [`AuditIssue`]s; any `Error` severity fails the zone.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::domaintree::DomainTree;
use crate::error::{Error, Result};
use crate::models::{DomainConfig, RecordConfig, RecordKey};
use crate::normalize::label;
use crate::providers::{Features, Support};
use crate::rtype::RTypeRegistry;

/// How serious an audit finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational; planning continues
    Warning,
    /// Blocks planning for the zone
    Error,
}

/// One audit finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditIssue {
    /// Severity
    pub severity: Severity,
    /// Record the finding is attached to, `TYPE fqdn`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
    /// What is wrong
    pub message: String,
}

impl AuditIssue {
    /// Blocking finding on a record
    pub fn error(rc: &RecordConfig, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            record: Some(rc.key().to_string()),
            message: message.into(),
        }
    }

    /// Informational finding on a record
    pub fn warning(rc: &RecordConfig, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            record: Some(rc.key().to_string()),
            message: message.into(),
        }
    }

    /// Blocking finding on the zone as a whole
    pub fn zone_error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            record: None,
            message: message.into(),
        }
    }

    /// Whether this finding blocks planning
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for AuditIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.record {
            Some(record) => write!(f, "{record}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Run handler audits and cross-record checks over a lowered domain.
pub fn audit_domain(dc: &DomainConfig, registry: &RTypeRegistry) -> Vec<AuditIssue> {
    let mut issues = Vec::new();

    for rc in &dc.records {
        match registry.lookup(&rc.rtype) {
            Ok(handler) => issues.extend(handler.audit(rc)),
            Err(e) => issues.push(AuditIssue::error(rc, e.to_string())),
        }
        if label::has_misplaced_wildcard(&rc.name) {
            issues.push(AuditIssue::error(
                rc,
                "wildcard is only allowed as the leftmost label",
            ));
        }
        let expected = label::name_to_fqdn(&rc.name, &dc.name);
        if rc.name_fqdn != expected {
            issues.push(AuditIssue::error(
                rc,
                format!("name {} does not match FQDN {}", rc.name, rc.name_fqdn),
            ));
        }
    }

    issues.extend(check_cname_exclusivity(&dc.records));
    issues.extend(check_record_sets(&dc.records, registry));
    issues.extend(check_unmanaged(dc));
    issues.extend(check_apex_ns(dc));
    issues
}

// Declared apex NS records must agree with the declared nameservers.
fn check_apex_ns(dc: &DomainConfig) -> Vec<AuditIssue> {
    let declared: HashSet<String> = dc
        .nameservers
        .iter()
        .map(|ns| ns.name.trim_end_matches('.').to_ascii_lowercase())
        .collect();
    dc.records
        .iter()
        .filter(|rc| rc.rtype == "NS" && rc.is_apex())
        .filter_map(|rc| {
            let target = rc.data.target_name()?.trim_end_matches('.').to_ascii_lowercase();
            if declared.is_empty() {
                Some(AuditIssue::warning(
                    rc,
                    "apex NS record without declared nameservers; provider nameservers are added alongside it",
                ))
            } else if declared.contains(&target) {
                None
            } else {
                Some(AuditIssue::error(
                    rc,
                    format!("apex NS target {target} is not one of the domain's nameservers"),
                ))
            }
        })
        .collect()
}

// A CNAME owns its name outright.
fn check_cname_exclusivity(records: &[RecordConfig]) -> Vec<AuditIssue> {
    let mut types_by_name: HashMap<&str, HashSet<&str>> = HashMap::new();
    for rc in records {
        types_by_name
            .entry(rc.name_fqdn.as_str())
            .or_default()
            .insert(rc.rtype.as_str());
    }
    records
        .iter()
        .filter(|rc| rc.rtype == "CNAME")
        .filter(|rc| {
            types_by_name
                .get(rc.name_fqdn.as_str())
                .is_some_and(|types| types.len() > 1)
        })
        .map(|rc| AuditIssue::error(rc, "CNAME cannot share its name with other records"))
        .collect()
}

fn check_record_sets(records: &[RecordConfig], registry: &RTypeRegistry) -> Vec<AuditIssue> {
    let mut issues = Vec::new();
    let mut sets: BTreeMap<RecordKey, Vec<&RecordConfig>> = BTreeMap::new();
    for rc in records {
        sets.entry(rc.key()).or_default().push(rc);
    }
    for members in sets.values() {
        let first = members[0];
        if members.iter().any(|rc| rc.ttl != first.ttl) {
            issues.push(AuditIssue::warning(
                first,
                "record set has mixed TTLs; providers may apply only one",
            ));
        }
        let mut seen = HashSet::new();
        for rc in members {
            if !seen.insert(registry.comparable(rc)) {
                issues.push(AuditIssue::error(
                    rc,
                    format!("duplicate record {}", registry.display(rc)),
                ));
            }
        }
    }
    issues
}

fn check_unmanaged(dc: &DomainConfig) -> Vec<AuditIssue> {
    if dc.unmanaged.is_empty() {
        return Vec::new();
    }
    let mut tree = DomainTree::new();
    for pattern in &dc.unmanaged {
        tree.add(&dc.name, pattern);
    }
    dc.records
        .iter()
        .filter(|rc| tree.get(&rc.name_fqdn))
        .map(|rc| AuditIssue::error(rc, "record is inside an unmanaged name"))
        .collect()
}

/// Check every record type against a provider's capability matrix.
///
/// `Cannot` is an error, `Unimplemented` a warning.
pub fn audit_capabilities(
    records: &[RecordConfig],
    provider_name: &str,
    provider_type: &str,
    features: &Features,
    registry: &RTypeRegistry,
) -> Vec<AuditIssue> {
    let mut issues = Vec::new();
    let mut checked: HashSet<&str> = HashSet::new();
    for rc in records {
        if !checked.insert(rc.rtype.as_str()) {
            continue;
        }
        let Ok(handler) = registry.lookup(&rc.rtype) else {
            continue;
        };
        if let Some(only) = handler.provider_only() {
            if !only.eq_ignore_ascii_case(provider_type) {
                issues.push(AuditIssue::error(
                    rc,
                    format!("{} records are only supported by {only}", rc.rtype),
                ));
                continue;
            }
        }
        let Some(capability) = handler.capability() else {
            continue;
        };
        match features.support(capability) {
            Support::Can => {}
            Support::Cannot => issues.push(AuditIssue::error(
                rc,
                format!("provider {provider_name} does not support {} records", rc.rtype),
            )),
            Support::Unimplemented => issues.push(AuditIssue::warning(
                rc,
                format!(
                    "provider {provider_name} has not implemented {} records yet",
                    rc.rtype
                ),
            )),
        }
    }
    issues
}

/// Log warnings and fail with [`Error::Audit`] if any finding is an error.
pub fn enforce(domain: &str, issues: &[AuditIssue]) -> Result<()> {
    for issue in issues.iter().filter(|i| !i.is_error()) {
        tracing::warn!("{}: {}", domain, issue);
    }
    let errors: Vec<String> = issues
        .iter()
        .filter(|i| i.is_error())
        .map(ToString::to_string)
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        for e in &errors {
            tracing::error!("{}: {}", domain, e);
        }
        Err(Error::Audit {
            domain: domain.to_string(),
            issues: errors,
        })
    }
}
