// # DomainConfig
//
// Desired state of one zone after the document has been loaded. Records are
// typed once lowering has run; `raw_records` is empty from then on.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::RawRecord;
use crate::models::record::{DEFAULT_TTL, RecordConfig};

/// An authoritative nameserver, FQDN without trailing dot
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Nameserver {
    /// Host name
    pub name: String,
}

impl Nameserver {
    /// Create a nameserver, dropping any trailing dot
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().trim().trim_end_matches('.').to_string(),
        }
    }
}

impl PartialEq for Nameserver {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl From<String> for Nameserver {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&str> for Nameserver {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<Nameserver> for String {
    fn from(ns: Nameserver) -> Self {
        ns.name
    }
}

impl fmt::Display for Nameserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// How many of a DNS provider's nameservers to delegate to
///
/// In documents this is an integer: `0` means none, a negative value means
/// all, a positive value caps the count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameserverCount {
    /// Do not use this provider's nameservers
    None,
    /// Use every nameserver the provider reports
    #[default]
    All,
    /// Use at most this many
    Cap(usize),
}

impl NameserverCount {
    /// Apply this policy to a provider's nameserver list.
    pub fn select<'a>(&self, available: &'a [Nameserver]) -> &'a [Nameserver] {
        match *self {
            Self::None => &[],
            Self::All => available,
            Self::Cap(n) => &available[..n.min(available.len())],
        }
    }
}

impl From<i64> for NameserverCount {
    fn from(n: i64) -> Self {
        match n {
            0 => Self::None,
            n if n < 0 => Self::All,
            n => Self::Cap(usize::try_from(n).unwrap_or(usize::MAX)),
        }
    }
}

impl Serialize for NameserverCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Self::None => serializer.serialize_i64(0),
            Self::All => serializer.serialize_i64(-1),
            Self::Cap(n) => serializer.serialize_u64(n as u64),
        }
    }
}

impl<'de> Deserialize<'de> for NameserverCount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(Self::from)
    }
}

/// A DNS service provider attached to a domain, in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRef {
    /// Provider instance name
    pub name: String,
    /// Nameserver policy for this provider
    pub nameserver_count: NameserverCount,
}

/// Desired state of one zone
#[derive(Debug, Clone, Default, Serialize)]
pub struct DomainConfig {
    /// Zone apex, lowercase, no trailing dot
    pub name: String,
    /// Registrar instance responsible for delegation
    pub registrar_name: String,
    /// DNS service providers, in declaration order
    #[serde(skip)]
    pub dsps: Vec<ProviderRef>,
    /// Nameservers the delegation must match
    pub nameservers: Vec<Nameserver>,
    /// Typed desired records
    pub records: Vec<RecordConfig>,
    /// Records that must not exist
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ensure_absent: Vec<RecordConfig>,
    /// Untyped tuples awaiting lowering
    #[serde(skip)]
    pub raw_records: Vec<RawRecord>,
    /// Leave records that are not in the desired state alone
    pub keep_unknown: bool,
    /// Label patterns whose existing records are never touched
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unmanaged: Vec<String>,
    /// TTL applied to records that ask to inherit it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ttl: Option<u32>,
    /// Opaque zone annotations
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl DomainConfig {
    /// Create an empty desired state for `name`.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().trim_end_matches('.').to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Attach a DNS service provider.
    pub fn with_dsp(mut self, name: impl Into<String>, nameserver_count: NameserverCount) -> Self {
        self.dsps.push(ProviderRef {
            name: name.into(),
            nameserver_count,
        });
        self
    }

    /// Append a typed record.
    pub fn with_record(mut self, record: RecordConfig) -> Self {
        self.records.push(record);
        self
    }

    /// Zone default TTL
    pub fn zone_ttl(&self) -> u32 {
        self.default_ttl.unwrap_or(DEFAULT_TTL)
    }

    /// Replace TTL 0 with the zone default on every record.
    pub fn apply_default_ttl(&mut self) {
        let ttl = self.zone_ttl();
        for rc in self.records.iter_mut().chain(self.ensure_absent.iter_mut()) {
            if rc.ttl == 0 {
                rc.ttl = ttl;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nameserver_equality_ignores_case_and_dot() {
        assert_eq!(Nameserver::new("NS1.Example.com."), Nameserver::new("ns1.example.com"));
        assert_eq!(Nameserver::new("ns1.x.").name, "ns1.x");
    }

    #[test]
    fn nameserver_count_from_integer() {
        assert_eq!(NameserverCount::from(0), NameserverCount::None);
        assert_eq!(NameserverCount::from(-1), NameserverCount::All);
        assert_eq!(NameserverCount::from(2), NameserverCount::Cap(2));

        let parsed: NameserverCount = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, NameserverCount::Cap(3));
        assert_eq!(serde_json::to_string(&NameserverCount::All).unwrap(), "-1");
    }

    #[test]
    fn nameserver_count_selects() {
        let all: Vec<Nameserver> = ["a", "b", "c", "d"].into_iter().map(Nameserver::from).collect();
        assert_eq!(NameserverCount::Cap(2).select(&all).len(), 2);
        assert_eq!(NameserverCount::Cap(9).select(&all).len(), 4);
        assert!(NameserverCount::None.select(&all).is_empty());
        assert_eq!(NameserverCount::All.select(&all).len(), 4);
    }
}
