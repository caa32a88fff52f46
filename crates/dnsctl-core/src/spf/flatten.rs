// # SPF flattening
//
// TXT records tagged with `spf_flatten` have the named includes replaced by
// the terms of the records they point at. Records tagged with `spf_split`
// are chained across extra TXT records when the result no longer fits one
// 255-octet string.
//
// ## Metadata
//
// - `spf_flatten`: `*` for every include, or a comma list of include targets
// - `spf_split`: owner label pattern of the overflow records, e.g. `_spf%d`

use std::collections::{BTreeSet, VecDeque};

use crate::audit::AuditIssue;
use crate::error::{Error, Result};
use crate::models::{DomainConfig, RecordConfig, RecordData};
use crate::normalize::txt::TXT_CHUNK_MAX;
use crate::spf::parse::{MAX_LOOKUPS, SpfPart, SpfPartKind, SpfRecord, is_spf, parse};
use crate::spf::resolver::SpfResolver;

/// Metadata key naming the includes to inline
pub const FLATTEN_META: &str = "spf_flatten";
/// Metadata key holding the overflow label pattern
pub const SPLIT_META: &str = "spf_split";

/// Which includes to inline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlattenTargets {
    /// Every include and redirect
    All,
    /// Only these target domains
    Only(BTreeSet<String>),
}

impl FlattenTargets {
    /// Parse a `spf_flatten` value.
    pub fn parse(value: &str) -> Self {
        if value.trim() == "*" {
            return Self::All;
        }
        Self::Only(
            value
                .split(',')
                .map(|d| d.trim().trim_end_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        )
    }

    fn matches(&self, domain: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(set) => set.contains(domain.trim_end_matches('.')),
        }
    }
}

/// Inline the selected includes of `record`, recursively.
///
/// Duplicate terms are dropped, keeping the first occurrence.
pub fn flatten(record: &SpfRecord, targets: &FlattenTargets) -> SpfRecord {
    let mut parts = Vec::new();
    inline(record, targets, true, &mut parts);

    let mut seen = BTreeSet::new();
    parts.retain(|p: &SpfPart| seen.insert(p.text.to_ascii_lowercase()));
    SpfRecord { parts }
}

fn inline(record: &SpfRecord, targets: &FlattenTargets, keep_all: bool, out: &mut Vec<SpfPart>) {
    for part in &record.parts {
        match &part.kind {
            SpfPartKind::Include { domain, record } if targets.matches(domain) => {
                // An included record's `all` only ends evaluation of that record.
                inline(record, targets, false, out);
            }
            SpfPartKind::Redirect { domain, record } if targets.matches(domain) => {
                inline(record, targets, keep_all, out);
            }
            SpfPartKind::All if !keep_all => {}
            _ => out.push(part.clone()),
        }
    }
}

/// Chain `record` across TXT records no longer than `limit` octets.
///
/// The first entry is the owner's own record; overflow records are named by
/// substituting `1, 2, ...` for `%d` in `pattern`, relative to `origin`.
/// Returns `(fqdn, text)` pairs.
pub fn split(
    record: &SpfRecord,
    owner_fqdn: &str,
    origin: &str,
    pattern: &str,
    limit: usize,
) -> Result<Vec<(String, String)>> {
    let text = record.to_text();
    if text.len() <= limit {
        return Ok(vec![(owner_fqdn.to_string(), text)]);
    }
    if !pattern.contains("%d") {
        return Err(Error::spf(format!(
            "{SPLIT_META} pattern {pattern:?} must contain %d"
        )));
    }
    let overflow_fqdn = |i: usize| format!("{}.{}", pattern.replace("%d", &i.to_string()), origin);

    let (tail, mechanisms): (Vec<&SpfPart>, Vec<&SpfPart>) = record.parts.iter().partition(|p| {
        matches!(
            p.kind,
            SpfPartKind::All | SpfPartKind::Modifier | SpfPartKind::Redirect { .. }
        )
    });
    let tail: String = tail.iter().map(|p| format!(" {}", p.text)).collect();
    let mut queue: VecDeque<&str> = mechanisms.iter().map(|p| p.text.as_str()).collect();

    let mut out = Vec::new();
    let mut index = 0;
    loop {
        let owner = if index == 0 {
            owner_fqdn.to_string()
        } else {
            overflow_fqdn(index)
        };
        let reserve = if index == 0 { tail.len() } else { 0 };
        let mut text = String::from("v=spf1");

        let rest: usize = queue.iter().map(|t| t.len() + 1).sum();
        if text.len() + rest + reserve <= limit {
            for term in queue.drain(..) {
                text.push(' ');
                text.push_str(term);
            }
            if index == 0 {
                text.push_str(&tail);
            }
            out.push((owner, text));
            break;
        }

        let include = format!(" include:{}", overflow_fqdn(index + 1));
        let mut taken = 0;
        while let Some(term) = queue.front() {
            if text.len() + 1 + term.len() + include.len() + reserve > limit {
                break;
            }
            text.push(' ');
            text.push_str(term);
            queue.pop_front();
            taken += 1;
        }
        if taken == 0 {
            return Err(Error::spf(format!(
                "cannot split SPF record of {owner_fqdn} into {limit}-octet records"
            )));
        }
        text.push_str(&include);
        if index == 0 {
            text.push_str(&tail);
        }
        out.push((owner, text));
        index += 1;
    }
    Ok(out)
}

/// Flatten and split every tagged SPF record of `dc`.
///
/// Returns the audit findings (over-lookup warnings). Tagged records lose
/// their SPF metadata; overflow records are appended to the domain.
pub async fn process_domain(
    dc: &mut DomainConfig,
    resolver: &dyn SpfResolver,
) -> Result<Vec<AuditIssue>> {
    let mut issues = Vec::new();
    let mut overflow = Vec::new();

    for rc in dc.records.iter_mut() {
        if rc.rtype != "TXT" || (rc.meta(FLATTEN_META).is_none() && rc.meta(SPLIT_META).is_none()) {
            continue;
        }
        let Some(text) = rc.txt_joined() else {
            continue;
        };
        if !is_spf(&text) {
            issues.push(AuditIssue::error(rc, "SPF metadata on a TXT record that is not SPF"));
            continue;
        }

        let mut record = parse(&text, resolver)
            .await
            .map_err(|e| Error::spf(format!("TXT {}: {}", rc.name_fqdn, e)))?;
        if let Some(targets) = rc.metadata.remove(FLATTEN_META) {
            record = flatten(&record, &FlattenTargets::parse(&targets));
            tracing::debug!("Flattened SPF of {}: {}", rc.name_fqdn, record.to_text());
        }
        let lookups = record.lookups();
        if lookups > MAX_LOOKUPS {
            issues.push(AuditIssue::warning(
                rc,
                format!("SPF record needs {lookups} DNS lookups (limit {MAX_LOOKUPS})"),
            ));
        }

        let chain = match rc.metadata.remove(SPLIT_META) {
            Some(pattern) => split(&record, &rc.name_fqdn, &dc.name, &pattern, TXT_CHUNK_MAX)?,
            None => vec![(rc.name_fqdn.clone(), record.to_text())],
        };
        let mut chain = chain.into_iter();
        if let Some((_, first)) = chain.next() {
            rc.set_txt(&first);
        }
        for (fqdn, text) in chain {
            let mut extra = RecordConfig::from_fqdn("TXT", &fqdn, &dc.name, RecordData::Txt(Vec::new()))
                .with_ttl(rc.ttl);
            extra.set_txt(&text);
            overflow.push(extra);
        }
    }

    if !overflow.is_empty() {
        tracing::debug!("Added {} SPF overflow records to {}", overflow.len(), dc.name);
        dc.records.extend(overflow);
    }
    Ok(issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct Fixture(HashMap<String, String>);

    impl Fixture {
        fn new(entries: &[(&str, &str)]) -> Self {
            Self(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
        }
    }

    #[async_trait]
    impl SpfResolver for Fixture {
        async fn get_txt(&self, label: &str) -> Result<Vec<String>> {
            Ok(self.0.get(label).cloned().into_iter().collect())
        }
    }

    fn spf_txt(text: &str) -> RecordConfig {
        let mut rc = RecordConfig::new("TXT", "@", "example.com", RecordData::Txt(Vec::new()));
        rc.set_txt(text);
        rc.ttl = 300;
        rc
    }

    #[tokio::test]
    async fn flatten_everything() {
        let resolver = Fixture::new(&[
            ("a.example.net", "v=spf1 ip4:192.0.2.0/24 include:b.example.net -all"),
            ("b.example.net", "v=spf1 ip4:198.51.100.0/24 ip4:192.0.2.0/24 ~all"),
        ]);
        let record = parse("v=spf1 mx include:a.example.net ~all", &resolver).await.unwrap();
        assert_eq!(record.lookups(), 3);

        let flat = flatten(&record, &FlattenTargets::parse("*"));
        assert_eq!(
            flat.to_text(),
            "v=spf1 mx ip4:192.0.2.0/24 ip4:198.51.100.0/24 ~all"
        );
        assert_eq!(flat.lookups(), 1);
    }

    #[tokio::test]
    async fn flatten_selected_targets_only() {
        let resolver = Fixture::new(&[
            ("a.example.net", "v=spf1 ip4:192.0.2.1 -all"),
            ("b.example.net", "v=spf1 ip4:192.0.2.2 -all"),
        ]);
        let record = parse("v=spf1 include:a.example.net include:b.example.net -all", &resolver)
            .await
            .unwrap();
        let flat = flatten(&record, &FlattenTargets::parse("b.example.net."));
        assert_eq!(flat.to_text(), "v=spf1 include:a.example.net ip4:192.0.2.2 -all");
    }

    #[test]
    fn split_chains_overflow_records() {
        let parts: Vec<SpfPart> = (0..40)
            .map(|i| SpfPart {
                text: format!("ip4:198.51.100.{i}"),
                kind: SpfPartKind::Ip,
            })
            .chain(std::iter::once(SpfPart {
                text: "~all".into(),
                kind: SpfPartKind::All,
            }))
            .collect();
        let record = SpfRecord { parts };
        let chain = split(&record, "example.com", "example.com", "_spf%d", TXT_CHUNK_MAX).unwrap();

        assert!(chain.len() > 1);
        assert_eq!(chain[0].0, "example.com");
        assert_eq!(chain[1].0, "_spf1.example.com");
        assert!(chain[0].1.contains("include:_spf1.example.com"));
        assert!(chain[0].1.ends_with("~all"));
        for (_, text) in &chain {
            assert!(text.len() <= TXT_CHUNK_MAX, "{text}");
            assert!(text.starts_with("v=spf1 "));
        }
        let total: usize = chain
            .iter()
            .map(|(_, t)| t.matches("ip4:").count())
            .sum();
        assert_eq!(total, 40);
    }

    #[test]
    fn split_requires_a_counter_in_the_pattern() {
        let parts = (0..40)
            .map(|i| SpfPart {
                text: format!("ip4:203.0.113.{i}"),
                kind: SpfPartKind::Ip,
            })
            .collect();
        let record = SpfRecord { parts };
        assert!(split(&record, "example.com", "example.com", "_spf", TXT_CHUNK_MAX).is_err());
    }

    #[tokio::test]
    async fn domain_pass_rewrites_tagged_records() {
        let resolver = Fixture::new(&[("_spf.example.net", "v=spf1 ip4:192.0.2.0/24 -all")]);
        let mut dc = DomainConfig::new("example.com")
            .with_record(
                spf_txt("v=spf1 include:_spf.example.net ~all").with_meta(FLATTEN_META, "*"),
            )
            .with_record(spf_txt("v=spf1 include:untouched.example.net ~all"));

        let issues = process_domain(&mut dc, &resolver).await.unwrap();
        assert!(issues.is_empty());
        assert_eq!(
            dc.records[0].txt_joined().unwrap(),
            "v=spf1 ip4:192.0.2.0/24 ~all"
        );
        assert!(dc.records[0].metadata.is_empty());
        assert_eq!(
            dc.records[1].txt_joined().unwrap(),
            "v=spf1 include:untouched.example.net ~all"
        );
    }

    #[tokio::test]
    async fn domain_pass_warns_over_lookup_limit() {
        let includes: Vec<String> = (0..11).map(|i| format!("include:s{i}.example.net")).collect();
        let entries: Vec<(String, String)> = (0..11)
            .map(|i| (format!("s{i}.example.net"), "v=spf1 -all".to_string()))
            .collect();
        let resolver = Fixture(entries.into_iter().collect());
        let text = format!("v=spf1 {} ~all", includes.join(" "));
        let mut dc = DomainConfig::new("example.com")
            .with_record(spf_txt(&text).with_meta(FLATTEN_META, "none.example.net"));

        let issues = process_domain(&mut dc, &resolver).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert!(!issues[0].is_error());
        assert!(issues[0].message.contains("11 DNS lookups"));
    }
}
