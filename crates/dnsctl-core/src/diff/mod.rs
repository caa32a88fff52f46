//! Diff/correction planner
//!
//! Compares a domain's desired records against what a provider reports and
//! emits changes at the granularity the provider works at:
//!
//! - [`by_record`]: one [`Change`] per record (`Diff1`)
//! - [`by_record_set`]: one [`Change`] per `(NameFQDN, Type)`
//! - [`by_zone`]: one [`ZoneChange`] replacing the whole zone
//!
//! Existing records under an `unmanaged` name are never touched. With
//! `keep_unknown`, records absent from the desired state are left alone
//! unless they are listed in `ensure_absent`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let opts = DiffOptions::for_features(registry, &features)
//!     .with_material_meta("cloudflare_proxy", "off");
//! let changes = diff::by_record(desired, &existing, &opts);
//! let (corrections, count) = diff::into_corrections(changes, move |change| {
//!     let client = client.clone();
//!     async move { client.apply(change).await }
//! });
//! ```

mod pairing;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::future::Future;

use crate::domaintree::DomainTree;
use crate::error::Result;
use crate::models::{Correction, DomainConfig, RecordConfig, RecordKey};
use crate::providers::{Capability, Features};
use crate::rtype::RTypeRegistry;

use pairing::{GroupDiff, Pairer};

/// What a change does
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verb {
    /// Remove records
    Delete,
    /// Add records
    Create,
    /// Replace records
    Change,
    /// Informational only
    Report,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Delete => "DELETE",
            Self::Create => "CREATE",
            Self::Change => "CHANGE",
            Self::Report => "REPORT",
        })
    }
}

/// One planned change
///
/// For [`by_record`], `old` and `new` hold at most one record each. For
/// [`by_record_set`], they hold the whole existing and desired set.
#[derive(Debug, Clone)]
pub struct Change {
    /// Operation
    pub verb: Verb,
    /// Record set this change touches
    pub key: RecordKey,
    /// Existing records, carrying their provider handles
    pub old: Vec<RecordConfig>,
    /// Desired records
    pub new: Vec<RecordConfig>,
    /// Human-readable lines, one per record-level difference
    pub msgs: Vec<String>,
}

impl Change {
    /// All message lines joined
    pub fn msg(&self) -> String {
        self.msgs.join("\n")
    }

    /// Whether applying this change has a provider-side effect
    pub fn is_action(&self) -> bool {
        self.verb != Verb::Report
    }
}

/// A whole-zone replacement
#[derive(Debug, Clone)]
pub struct ZoneChange {
    /// One line per record-level difference
    pub msgs: Vec<String>,
    /// Number of record-level differences
    pub count: usize,
    /// Complete contents the zone must have afterwards
    pub records: Vec<RecordConfig>,
}

/// Planner settings of one provider
#[derive(Clone)]
pub struct DiffOptions<'r> {
    /// Canonicalization of records
    pub registry: &'r RTypeRegistry,
    /// Metadata keys that take part in equality, with the value a missing
    /// key stands for
    pub material_meta: BTreeMap<String, String>,
    /// Emit DELETEs before CREATEs before CHANGEs
    pub deletes_first: bool,
}

impl<'r> DiffOptions<'r> {
    /// Options with no material metadata and alphabetical ordering
    pub fn new(registry: &'r RTypeRegistry) -> Self {
        Self {
            registry,
            material_meta: BTreeMap::new(),
            deletes_first: false,
        }
    }

    /// Options derived from a provider's capability matrix
    pub fn for_features(registry: &'r RTypeRegistry, features: &Features) -> Self {
        Self::new(registry).with_deletes_first(features.has(Capability::CanOnlyDiff1Features))
    }

    /// Make `key` take part in equality; a missing key counts as `default`.
    pub fn with_material_meta(mut self, key: impl Into<String>, default: impl Into<String>) -> Self {
        self.material_meta.insert(key.into(), default.into());
        self
    }

    /// Builder-style ordering switch
    pub fn with_deletes_first(mut self, deletes_first: bool) -> Self {
        self.deletes_first = deletes_first;
        self
    }
}

struct Planned<'a> {
    groups: Vec<(RecordKey, GroupDiff<'a>)>,
    preserved: Vec<&'a RecordConfig>,
}

fn plan<'a>(desired: &'a DomainConfig, existing: &'a [RecordConfig], opts: &DiffOptions<'_>) -> Planned<'a> {
    let mut unmanaged = DomainTree::new();
    for pattern in &desired.unmanaged {
        unmanaged.add(&desired.name, pattern);
    }

    let mut preserved = Vec::new();
    let mut groups: BTreeMap<RecordKey, (Vec<&RecordConfig>, Vec<&RecordConfig>)> = BTreeMap::new();
    for rc in &desired.records {
        groups.entry(rc.key()).or_default().0.push(rc);
    }
    for rc in existing {
        if !unmanaged.is_empty() && unmanaged.get(&rc.name_fqdn) {
            tracing::trace!("Leaving unmanaged {} {} alone", rc.rtype, rc.name_fqdn);
            preserved.push(rc);
            continue;
        }
        groups.entry(rc.key()).or_default().1.push(rc);
    }

    let absent: HashSet<(RecordKey, String)> = desired
        .ensure_absent
        .iter()
        .map(|rc| (rc.key(), opts.registry.comparable(rc)))
        .collect();
    let is_absent = |rc: &RecordConfig| absent.contains(&(rc.key(), opts.registry.comparable(rc)));

    let pairer = Pairer {
        registry: opts.registry,
        material: &opts.material_meta,
        keep_unknown: desired.keep_unknown,
    };
    let groups = groups
        .into_iter()
        .map(|(key, (want, have))| (key, pairer.pair(&want, &have, &is_absent)))
        .collect();
    Planned { groups, preserved }
}

fn describe(rc: &RecordConfig, registry: &RTypeRegistry) -> String {
    format!(
        "{} {} {} ttl={}",
        rc.rtype,
        rc.name_fqdn,
        registry.display(rc),
        rc.ttl
    )
}

fn order(changes: &mut [Change], deletes_first: bool) {
    if deletes_first {
        changes.sort_by(|a, b| a.verb.cmp(&b.verb).then_with(|| a.key.cmp(&b.key)));
    } else {
        changes.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.verb.cmp(&b.verb)));
    }
}

/// Plan one change per record.
pub fn by_record(desired: &DomainConfig, existing: &[RecordConfig], opts: &DiffOptions<'_>) -> Vec<Change> {
    let planned = plan(desired, existing, opts);
    let mut changes = Vec::new();
    for (key, group) in planned.groups {
        for rc in group.deletes {
            changes.push(Change {
                verb: Verb::Delete,
                key: key.clone(),
                old: vec![rc.clone()],
                new: Vec::new(),
                msgs: vec![format!("- DELETE {}", describe(rc, opts.registry))],
            });
        }
        for rc in group.creates {
            changes.push(Change {
                verb: Verb::Create,
                key: key.clone(),
                old: Vec::new(),
                new: vec![rc.clone()],
                msgs: vec![format!("+ CREATE {}", describe(rc, opts.registry))],
            });
        }
        for (verb, pairs) in [(Verb::Change, group.changes), (Verb::Report, group.reports)] {
            for p in pairs {
                changes.push(Change {
                    verb,
                    key: key.clone(),
                    old: vec![p.existing.clone()],
                    new: vec![p.desired.clone()],
                    msgs: vec![p.msg],
                });
            }
        }
    }
    order(&mut changes, opts.deletes_first);
    changes
}

/// Plan one change per `(NameFQDN, Type)` set.
///
/// A set with differences is replaced as a whole: `new` carries every
/// desired member, `old` every existing member the planner manages.
/// Unmanaged and kept records appear in neither.
pub fn by_record_set(desired: &DomainConfig, existing: &[RecordConfig], opts: &DiffOptions<'_>) -> Vec<Change> {
    let planned = plan(desired, existing, opts);
    let mut changes = Vec::new();
    for (key, group) in planned.groups {
        if group.is_empty() {
            continue;
        }
        let mut msgs = Vec::new();
        msgs.extend(group.deletes.iter().map(|rc| format!("- DELETE {}", describe(rc, opts.registry))));
        msgs.extend(group.creates.iter().map(|rc| format!("+ CREATE {}", describe(rc, opts.registry))));
        msgs.extend(group.changes.iter().map(|p| p.msg.clone()));
        msgs.extend(group.reports.iter().map(|p| p.msg.clone()));

        let old: Vec<RecordConfig> = group.managed_existing().into_iter().cloned().collect();
        let new: Vec<RecordConfig> = desired
            .records
            .iter()
            .filter(|rc| rc.key() == key)
            .cloned()
            .collect();

        let verb = if group.creates.is_empty() && group.deletes.is_empty() && group.changes.is_empty() {
            Verb::Report
        } else if old.is_empty() {
            Verb::Create
        } else if new.is_empty() {
            Verb::Delete
        } else {
            Verb::Change
        };
        changes.push(Change {
            verb,
            key,
            old,
            new,
            msgs,
        });
    }
    order(&mut changes, opts.deletes_first);
    changes
}

/// Plan a whole-zone replacement, or `None` when nothing needs to change.
///
/// Metadata-only differences are listed but do not on their own trigger a
/// replacement.
pub fn by_zone(desired: &DomainConfig, existing: &[RecordConfig], opts: &DiffOptions<'_>) -> Option<ZoneChange> {
    let changes = by_record(desired, existing, opts);
    let count = changes.iter().filter(|c| c.is_action()).count();
    if count == 0 {
        return None;
    }

    let planned = plan(desired, existing, opts);
    let mut records = desired.records.clone();
    records.extend(planned.preserved.into_iter().cloned());
    for (_, group) in planned.groups {
        records.extend(group.kept.into_iter().cloned());
    }
    Some(ZoneChange {
        msgs: changes.iter().map(Change::msg).collect(),
        count,
        records,
    })
}

/// Turn changes into corrections, applying each actionable one with `apply`.
///
/// Returns the corrections and the number of actionable ones.
pub fn into_corrections<F, Fut>(changes: Vec<Change>, apply: F) -> (Vec<Correction>, usize)
where
    F: Fn(Change) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let mut count = 0;
    let corrections = changes
        .into_iter()
        .map(|change| {
            if !change.is_action() {
                return Correction::report(change.msg());
            }
            count += 1;
            let apply = apply.clone();
            Correction::new(change.msg(), move || apply(change))
        })
        .collect();
    (corrections, count)
}
