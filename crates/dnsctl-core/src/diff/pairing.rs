// # Record pairing
//
// Matches desired records against existing ones within a single
// `(NameFQDN, Type)` group. Passes run in order and each only sees what the
// earlier passes left unpaired:
//
// 1. same canonical form, same TTL, same material metadata
// 2. same canonical form (TTL or material metadata differ)
// 3. same per-type identity (MX preference, SRV priority/weight/port, ...)
// 4. positional, in input order (skipped when unknown records are kept)
//
// Whatever is left over is created or deleted.

use std::collections::BTreeMap;

use crate::models::{RecordConfig, RecordData};
use crate::rtype::RTypeRegistry;

/// Result of pairing one group
#[derive(Debug, Default)]
pub(crate) struct GroupDiff<'a> {
    pub creates: Vec<&'a RecordConfig>,
    pub deletes: Vec<&'a RecordConfig>,
    pub changes: Vec<Paired<'a>>,
    pub reports: Vec<Paired<'a>>,
    /// Unpaired existing records left in place
    pub kept: Vec<&'a RecordConfig>,
    /// Existing records matching their desired counterpart exactly
    pub unchanged: Vec<&'a RecordConfig>,
}

/// An existing record paired with its desired replacement
#[derive(Debug)]
pub(crate) struct Paired<'a> {
    pub existing: &'a RecordConfig,
    pub desired: &'a RecordConfig,
    pub msg: String,
}

impl<'a> GroupDiff<'a> {
    /// Existing records this group manages: everything but `kept`.
    pub fn managed_existing(&self) -> Vec<&'a RecordConfig> {
        let mut out = self.unchanged.clone();
        out.extend(self.changes.iter().map(|p| p.existing));
        out.extend(self.reports.iter().map(|p| p.existing));
        out.extend(self.deletes.iter().copied());
        out
    }

    pub fn is_empty(&self) -> bool {
        self.creates.is_empty()
            && self.deletes.is_empty()
            && self.changes.is_empty()
            && self.reports.is_empty()
    }
}

pub(crate) struct Pairer<'r> {
    pub registry: &'r RTypeRegistry,
    /// Material metadata keys and the value a missing key stands for
    pub material: &'r BTreeMap<String, String>,
    pub keep_unknown: bool,
}

impl Pairer<'_> {
    /// Pair one group. `absent` are existing records that must go even when
    /// unknown records are kept.
    pub fn pair<'a>(
        &self,
        desired: &[&'a RecordConfig],
        existing: &[&'a RecordConfig],
        absent: &dyn Fn(&RecordConfig) -> bool,
    ) -> GroupDiff<'a> {
        let mut diff = GroupDiff::default();
        let mut want: Vec<Option<&'a RecordConfig>> = desired.iter().copied().map(Some).collect();
        let mut have: Vec<Option<&'a RecordConfig>> = existing.iter().copied().map(Some).collect();

        let full = |rc: &RecordConfig| (self.registry.comparable(rc), rc.ttl, self.material_of(rc));
        self.pass(&mut want, &mut have, |d, e| full(d) == full(e), &mut diff);

        let data = |rc: &RecordConfig| self.registry.comparable(rc);
        self.pass(&mut want, &mut have, |d, e| data(d) == data(e), &mut diff);

        self.pass(
            &mut want,
            &mut have,
            |d, e| matches!((identity(&d.data), identity(&e.data)), (Some(a), Some(b)) if a == b),
            &mut diff,
        );

        if !self.keep_unknown {
            let mut rest = have.iter_mut().filter(|e| e.is_some());
            for d in want.iter_mut().filter(|d| d.is_some()) {
                let Some(slot) = rest.next() else { break };
                if let (Some(d), Some(e)) = (d.take(), slot.take()) {
                    self.record_pair(d, e, &mut diff);
                }
            }
        }

        diff.creates.extend(want.into_iter().flatten());
        for e in have.into_iter().flatten() {
            if !self.keep_unknown || absent(e) {
                diff.deletes.push(e);
            } else {
                diff.kept.push(e);
            }
        }
        diff
    }

    fn pass<'a>(
        &self,
        want: &mut [Option<&'a RecordConfig>],
        have: &mut [Option<&'a RecordConfig>],
        same: impl Fn(&RecordConfig, &RecordConfig) -> bool,
        diff: &mut GroupDiff<'a>,
    ) {
        for slot in want.iter_mut() {
            let Some(d) = *slot else { continue };
            let found = have
                .iter_mut()
                .find(|e| e.is_some_and(|e| same(d, e)));
            if let Some(e) = found.and_then(Option::take) {
                *slot = None;
                self.record_pair(d, e, diff);
            }
        }
    }

    fn record_pair<'a>(&self, d: &'a RecordConfig, e: &'a RecordConfig, diff: &mut GroupDiff<'a>) {
        let old = self.registry.comparable(e);
        let new = self.registry.comparable(d);
        let material: Vec<String> = self
            .material
            .iter()
            .filter_map(|(key, default)| {
                let before = e.meta(key).unwrap_or(default);
                let after = d.meta(key).unwrap_or(default);
                (before != after).then(|| format!("{key}={before} -> {after}"))
            })
            .collect();

        let msg = if old != new {
            Some(format!(
                "± CHANGE {} {} {} -> {} ttl={}",
                d.rtype,
                d.name_fqdn,
                self.registry.display(e),
                self.registry.display(d),
                d.ttl
            ))
        } else if !material.is_empty() {
            Some(format!(
                "± CHANGE {} {} {} ttl={} ({})",
                d.rtype,
                d.name_fqdn,
                self.registry.display(d),
                d.ttl,
                material.join(", ")
            ))
        } else if e.ttl != d.ttl {
            Some(format!(
                "± CHANGE-TTL {} {} {} ttl={} -> ttl={}",
                d.rtype,
                d.name_fqdn,
                self.registry.display(d),
                e.ttl,
                d.ttl
            ))
        } else {
            None
        };

        if let Some(msg) = msg {
            diff.changes.push(Paired {
                existing: e,
                desired: d,
                msg,
            });
            return;
        }

        // Observed metadata the desired record disagrees with, that no
        // provider action can fix.
        let reported: Vec<String> = e
            .metadata
            .iter()
            .filter(|(key, _)| !self.material.contains_key(*key))
            .filter_map(|(key, before)| {
                let after = d.meta(key)?;
                (after != before.as_str()).then(|| format!("{key}={before} -> {after}"))
            })
            .collect();
        if !reported.is_empty() {
            diff.reports.push(Paired {
                existing: e,
                desired: d,
                msg: format!(
                    "REPORT {} {} {}: {}",
                    d.rtype,
                    d.name_fqdn,
                    self.registry.display(d),
                    reported.join(", ")
                ),
            });
        } else {
            diff.unchanged.push(e);
        }
    }

    fn material_of(&self, rc: &RecordConfig) -> Vec<String> {
        self.material
            .iter()
            .map(|(key, default)| rc.meta(key).unwrap_or(default).to_string())
            .collect()
    }
}

/// Fields that name "the same logical entry" for types whose sets hold
/// several distinct entries.
fn identity(data: &RecordData) -> Option<String> {
    match data {
        RecordData::Mx { preference, .. } => Some(preference.to_string()),
        RecordData::Srv {
            priority,
            weight,
            port,
            ..
        } => Some(format!("{priority} {weight} {port}")),
        RecordData::Caa { flag, tag, .. } => Some(format!("{flag} {tag}")),
        RecordData::Tlsa {
            usage,
            selector,
            matching_type,
            ..
        } => Some(format!("{usage} {selector} {matching_type}")),
        RecordData::Ds { key_tag, .. } => Some(key_tag.to_string()),
        RecordData::Svcb { priority, .. } => Some(priority.to_string()),
        _ => None,
    }
}
