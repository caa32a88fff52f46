//! Configuration types for dnsctl
//!
//! This module defines the desired-state interchange document produced by
//! the host scripting runtime, provider credentials, and engine settings.

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::{DomainConfig, Nameserver, NameserverCount, ProviderRef, RecordConfig};

/// One positional argument of a raw record tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawArg {
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// String
    Str(String),
    /// List of strings
    List(Vec<String>),
}

impl RawArg {
    /// Short name of the variant, used in mismatch errors
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
        }
    }
}

impl fmt::Display for RawArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

/// Untyped record tuple as emitted by the interpreter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Record type token
    #[serde(rename = "type")]
    pub rtype: String,
    /// Positional arguments; the first is always the label
    pub args: Vec<RawArg>,
    /// TTL in seconds, 0 inherits the zone default
    #[serde(default)]
    pub ttl: u32,
    /// Free-form annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, serde_json::Value>,
    /// Extension-scope label prefix
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subdomain: String,
    /// Express a deletion instead of a desired record
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ensure_absent: bool,
}

impl RawRecord {
    /// Create a raw tuple from a label and payload arguments.
    pub fn new(rtype: impl Into<String>, label: impl Into<String>, payload: Vec<RawArg>) -> Self {
        let mut args = vec![RawArg::Str(label.into())];
        args.extend(payload);
        Self {
            rtype: rtype.into(),
            args,
            ttl: 0,
            meta: BTreeMap::new(),
            subdomain: String::new(),
            ensure_absent: false,
        }
    }

    /// Builder-style TTL setter
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Re-serialize a typed record into the tuple that lowers back to it.
    pub fn from_record(rc: &RecordConfig) -> Self {
        let mut raw = Self::new(rc.rtype.clone(), rc.name.clone(), rc.data.to_args());
        raw.ttl = rc.ttl;
        raw.meta = rc
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        raw
    }
}

/// Declaration of a provider instance in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDecl {
    /// Instance name, also the key into the credentials file
    pub name: String,
    /// Provider type name as registered (e.g. "CLOUDFLAREAPI")
    #[serde(rename = "type")]
    pub provider_type: String,
    /// Provider-specific settings
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub meta: serde_json::Value,
}

/// One domain in the desired-state document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainDocument {
    /// Zone apex
    pub name: String,
    /// Registrar instance name
    #[serde(default)]
    pub registrar: String,
    /// DNS provider instance name → nameserver count, in document order
    #[serde(
        default,
        rename = "dnsProviders",
        alias = "dsps",
        deserialize_with = "deserialize_provider_refs",
        serialize_with = "serialize_provider_refs"
    )]
    pub dns_providers: Vec<ProviderRef>,
    /// Explicit nameservers
    #[serde(default)]
    pub nameservers: Vec<Nameserver>,
    /// Raw record tuples
    #[serde(default)]
    pub records: Vec<RawRecord>,
    /// Do not delete records missing from the desired state
    #[serde(default, rename = "keepunknown")]
    pub keep_unknown: bool,
    /// Label patterns left alone by the planner
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmanaged: Vec<String>,
    /// Zone default TTL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_ttl: Option<u32>,
    /// Zone annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl DomainDocument {
    /// Convert into the runtime domain model; records still need lowering.
    pub fn into_domain_config(self) -> DomainConfig {
        let mut dc = DomainConfig::new(&self.name);
        dc.registrar_name = self.registrar;
        dc.dsps = self.dns_providers;
        dc.nameservers = self.nameservers;
        dc.raw_records = self.records;
        dc.keep_unknown = self.keep_unknown;
        dc.unmanaged = self.unmanaged;
        dc.default_ttl = self.default_ttl;
        dc.metadata = self.meta;
        dc
    }

    /// Rebuild a document entry from a lowered domain.
    pub fn from_domain_config(dc: &DomainConfig) -> Self {
        let mut records: Vec<RawRecord> = dc.records.iter().map(RawRecord::from_record).collect();
        records.extend(dc.ensure_absent.iter().map(|rc| RawRecord {
            ensure_absent: true,
            ..RawRecord::from_record(rc)
        }));
        Self {
            name: dc.name.clone(),
            registrar: dc.registrar_name.clone(),
            dns_providers: dc.dsps.clone(),
            nameservers: dc.nameservers.clone(),
            records,
            keep_unknown: dc.keep_unknown,
            unmanaged: dc.unmanaged.clone(),
            default_ttl: dc.default_ttl,
            meta: dc.metadata.clone(),
        }
    }
}

fn deserialize_provider_refs<'de, D>(deserializer: D) -> std::result::Result<Vec<ProviderRef>, D::Error>
where
    D: Deserializer<'de>,
{
    struct RefsVisitor;

    impl<'de> Visitor<'de> for RefsVisitor {
        type Value = Vec<ProviderRef>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of provider name to nameserver count")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
            let mut refs = Vec::new();
            while let Some((name, nameserver_count)) = map.next_entry::<String, NameserverCount>()? {
                refs.push(ProviderRef {
                    name,
                    nameserver_count,
                });
            }
            Ok(refs)
        }
    }

    deserializer.deserialize_map(RefsVisitor)
}

fn serialize_provider_refs<S>(refs: &[ProviderRef], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(refs.iter().map(|r| (&r.name, r.nameserver_count)))
}

/// The desired-state interchange document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnsDocument {
    /// Registrar instances
    #[serde(default)]
    pub registrars: Vec<ProviderDecl>,
    /// DNS service provider instances
    #[serde(default, rename = "dns_providers", alias = "dnsProviders")]
    pub dns_providers: Vec<ProviderDecl>,
    /// Domains to reconcile
    #[serde(default)]
    pub domains: Vec<DomainDocument>,
}

impl DnsDocument {
    /// Parse a document from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let doc: Self = serde_json::from_str(text)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Read and parse a document file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::config(format!("Failed to read document {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Runtime domain models of every domain, in document order
    pub fn domain_configs(&self) -> Vec<DomainConfig> {
        self.domains
            .iter()
            .cloned()
            .map(DomainDocument::into_domain_config)
            .collect()
    }

    /// Validate cross references between domains and provider declarations
    pub fn validate(&self) -> Result<()> {
        for domain in &self.domains {
            if domain.name.trim().is_empty() {
                return Err(Error::config("Domain name cannot be empty"));
            }
            if !domain.registrar.is_empty()
                && !self.registrars.iter().any(|r| r.name == domain.registrar)
            {
                return Err(Error::config(format!(
                    "Domain {} uses undeclared registrar {}",
                    domain.name, domain.registrar
                )));
            }
            for dsp in &domain.dns_providers {
                if !self.dns_providers.iter().any(|p| p.name == dsp.name) {
                    return Err(Error::config(format!(
                        "Domain {} uses undeclared DNS provider {}",
                        domain.name, dsp.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Credentials of one provider instance
///
/// The Debug implementation intentionally does NOT expose values.
#[derive(Clone, Default)]
pub struct ProviderCredentials {
    /// Provider instance name
    pub name: String,
    values: BTreeMap<String, String>,
}

impl ProviderCredentials {
    /// Create credentials for `name` from a key/value map
    pub fn new(name: impl Into<String>, values: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Optional value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Required value; missing or empty keys fail with the provider's name
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::missing_credential(&self.name, key))
    }

    /// Provider type hint (`TYPE` key), if present
    pub fn type_hint(&self) -> Option<&str> {
        self.get("TYPE")
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("name", &self.name)
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Parse a credentials file: `{ name: { key: value } }`.
///
/// Values written as `$VAR` are read from the environment.
pub fn parse_credentials(text: &str) -> Result<HashMap<String, ProviderCredentials>> {
    let raw: HashMap<String, BTreeMap<String, String>> = serde_json::from_str(text)?;
    raw.into_iter()
        .map(|(name, values)| {
            let values = values
                .into_iter()
                .map(|(k, v)| Ok((k, expand_env(&v)?)))
                .collect::<Result<BTreeMap<_, _>>>()?;
            Ok((name.clone(), ProviderCredentials::new(name, values)))
        })
        .collect()
}

/// Read and parse a credentials file.
pub async fn load_credentials(path: impl AsRef<Path>) -> Result<HashMap<String, ProviderCredentials>> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::config(format!("Failed to read credentials {}: {}", path.display(), e))
    })?;
    parse_credentials(&text)
}

fn expand_env(value: &str) -> Result<String> {
    match value.strip_prefix('$') {
        Some(var) if !var.is_empty() => std::env::var(var)
            .map_err(|_| Error::config(format!("Environment variable {var} is not set"))),
        _ => Ok(value.to_string()),
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on concurrent corrections per provider
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Create missing zones before planning (push only)
    #[serde(default)]
    pub populate: bool,

    /// Fail a domain that names an undeclared provider instead of skipping it
    #[serde(default = "default_strict_providers")]
    pub strict_providers: bool,

    /// Only reconcile these domains (empty means all)
    #[serde(default)]
    pub domains: Vec<String>,

    /// Only plan against these provider instances (empty means all)
    #[serde(default)]
    pub providers: Vec<String>,
}

impl EngineConfig {
    /// Validate the engine settings
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::config("Engine concurrency must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    /// Whether `domain` passes the domain filter
    pub fn wants_domain(&self, domain: &str) -> bool {
        self.domains.is_empty() || self.domains.iter().any(|d| d.eq_ignore_ascii_case(domain))
    }

    /// Whether `provider` passes the provider filter
    pub fn wants_provider(&self, provider: &str) -> bool {
        self.providers.is_empty() || self.providers.iter().any(|p| p == provider)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            event_channel_capacity: default_event_channel_capacity(),
            populate: false,
            strict_providers: default_strict_providers(),
            domains: Vec::new(),
            providers: Vec::new(),
        }
    }
}

fn default_strict_providers() -> bool {
    true
}

fn default_concurrency() -> usize {
    4
}

fn default_event_channel_capacity() -> usize {
    1000
}
