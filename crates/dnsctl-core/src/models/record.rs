// # RecordConfig
//
// A single desired or observed DNS record. The payload is typed by record
// type through [`RecordData`]; equality for planning goes through the
// canonical form the registry produces, never through `Debug` or `==`.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use crate::normalize::{label, txt};

/// Default TTL applied to records that ask to inherit the zone default
pub const DEFAULT_TTL: u32 = 300;

/// Typed record payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordData {
    /// IPv4 address (A)
    A(Ipv4Addr),
    /// IPv6 address (AAAA)
    Aaaa(Ipv6Addr),
    /// Single host name target (CNAME, NS, PTR, ALIAS)
    Target(String),
    /// Mail exchanger
    Mx {
        /// Preference, lower wins
        preference: u16,
        /// Exchange host
        target: String,
    },
    /// Unquoted character-strings, each at most 255 octets
    Txt(Vec<String>),
    /// Service locator
    Srv {
        /// Priority
        priority: u16,
        /// Weight
        weight: u16,
        /// Port
        port: u16,
        /// Target host
        target: String,
    },
    /// Certification authority authorization
    Caa {
        /// Flags octet
        flag: u8,
        /// Property tag (`issue`, `issuewild`, `iodef`)
        tag: String,
        /// Property value
        value: String,
    },
    /// TLS association
    Tlsa {
        /// Certificate usage
        usage: u8,
        /// Selector
        selector: u8,
        /// Matching type
        matching_type: u8,
        /// Association data, hex
        certificate: String,
    },
    /// Delegation signer
    Ds {
        /// Key tag
        key_tag: u16,
        /// Algorithm
        algorithm: u8,
        /// Digest type
        digest_type: u8,
        /// Digest, hex
        digest: String,
    },
    /// Service binding (SVCB, HTTPS)
    Svcb {
        /// Priority, 0 for alias mode
        priority: u16,
        /// Target name
        target: String,
        /// Space separated `key=value` parameters
        params: String,
    },
    /// Positional fields of a vendor record type
    Fields(Vec<String>),
}

impl RecordData {
    /// Host name this payload points at, if it has one.
    pub fn target_name(&self) -> Option<&str> {
        match self {
            Self::Target(t) | Self::Mx { target: t, .. } | Self::Srv { target: t, .. } => Some(t),
            Self::Svcb { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Positional arguments that rebuild this payload through `FromRaw`.
    pub fn to_args(&self) -> Vec<crate::config::RawArg> {
        use crate::config::RawArg;
        match self {
            Self::A(ip) => vec![RawArg::Str(ip.to_string())],
            Self::Aaaa(ip) => vec![RawArg::Str(ip.to_string())],
            Self::Target(t) => vec![RawArg::Str(t.clone())],
            Self::Mx { preference, target } => {
                vec![RawArg::Int(i64::from(*preference)), RawArg::Str(target.clone())]
            }
            Self::Txt(chunks) => vec![RawArg::List(chunks.clone())],
            Self::Srv {
                priority,
                weight,
                port,
                target,
            } => vec![
                RawArg::Int(i64::from(*priority)),
                RawArg::Int(i64::from(*weight)),
                RawArg::Int(i64::from(*port)),
                RawArg::Str(target.clone()),
            ],
            Self::Caa { flag, tag, value } => vec![
                RawArg::Int(i64::from(*flag)),
                RawArg::Str(tag.clone()),
                RawArg::Str(value.clone()),
            ],
            Self::Tlsa {
                usage,
                selector,
                matching_type,
                certificate,
            } => vec![
                RawArg::Int(i64::from(*usage)),
                RawArg::Int(i64::from(*selector)),
                RawArg::Int(i64::from(*matching_type)),
                RawArg::Str(certificate.clone()),
            ],
            Self::Ds {
                key_tag,
                algorithm,
                digest_type,
                digest,
            } => vec![
                RawArg::Int(i64::from(*key_tag)),
                RawArg::Int(i64::from(*algorithm)),
                RawArg::Int(i64::from(*digest_type)),
                RawArg::Str(digest.clone()),
            ],
            Self::Svcb {
                priority,
                target,
                params,
            } => vec![
                RawArg::Int(i64::from(*priority)),
                RawArg::Str(target.clone()),
                RawArg::Str(params.clone()),
            ],
            Self::Fields(fields) => fields.iter().cloned().map(RawArg::Str).collect(),
        }
    }
}

/// Canonical zone-file rendering of the payload.
impl fmt::Display for RecordData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A(ip) => write!(f, "{ip}"),
            Self::Aaaa(ip) => write!(f, "{ip}"),
            Self::Target(t) => write!(f, "{t}"),
            Self::Mx { preference, target } => write!(f, "{preference} {target}"),
            Self::Txt(chunks) => write!(f, "{}", txt::encode_wire(chunks)),
            Self::Srv {
                priority,
                weight,
                port,
                target,
            } => write!(f, "{priority} {weight} {port} {target}"),
            Self::Caa { flag, tag, value } => write!(f, "{flag} {tag} {}", txt::quote(value)),
            Self::Tlsa {
                usage,
                selector,
                matching_type,
                certificate,
            } => write!(f, "{usage} {selector} {matching_type} {certificate}"),
            Self::Ds {
                key_tag,
                algorithm,
                digest_type,
                digest,
            } => write!(f, "{key_tag} {algorithm} {digest_type} {digest}"),
            Self::Svcb {
                priority,
                target,
                params,
            } => {
                if params.is_empty() {
                    write!(f, "{priority} {target}")
                } else {
                    write!(f, "{priority} {target} {params}")
                }
            }
            Self::Fields(fields) => write!(f, "{}", fields.join(" ")),
        }
    }
}

/// Opaque back-reference to the provider-native value a record was read from.
///
/// The planner never looks inside; providers downcast it in their thunks.
#[derive(Clone)]
pub struct ProviderHandle {
    tag: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl ProviderHandle {
    /// Wrap a provider-native value.
    pub fn new<T: Any + Send + Sync>(tag: &'static str, value: T) -> Self {
        Self {
            tag,
            inner: Arc::new(value),
        }
    }

    /// Name of the provider that created this handle
    pub fn provider_tag(&self) -> &'static str {
        self.tag
    }

    /// Borrow the native value if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("provider", &self.tag)
            .finish_non_exhaustive()
    }
}

/// Grouping key of a record set: `(NameFQDN, Type)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    /// Fully qualified owner name
    pub name_fqdn: String,
    /// Record type token
    pub rtype: String,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.rtype, self.name_fqdn)
    }
}

/// A single desired or observed DNS record
#[derive(Debug, Clone, Serialize)]
pub struct RecordConfig {
    /// Uppercase record type token
    #[serde(rename = "type")]
    pub rtype: String,
    /// Short label, `@` for the apex
    pub name: String,
    /// Fully qualified name without trailing dot
    pub name_fqdn: String,
    /// Extension-scope label prefix this record came from
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subdomain: String,
    /// Seconds; 0 inherits the zone default
    pub ttl: u32,
    /// Opaque annotations
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// Typed payload
    pub data: RecordData,
    /// Provider-native value this record was parsed from
    #[serde(skip)]
    pub original: Option<ProviderHandle>,
}

impl RecordConfig {
    /// Create a record at `label` within `origin`.
    pub fn new(rtype: impl Into<String>, label: &str, origin: &str, data: RecordData) -> Self {
        let mut rc = Self {
            rtype: rtype.into().to_ascii_uppercase(),
            name: String::new(),
            name_fqdn: String::new(),
            subdomain: String::new(),
            ttl: 0,
            metadata: BTreeMap::new(),
            data,
            original: None,
        };
        rc.set_label(label, origin);
        rc
    }

    /// Create a record from a fully qualified owner name.
    pub fn from_fqdn(rtype: impl Into<String>, fqdn: &str, origin: &str, data: RecordData) -> Self {
        let short = label::fqdn_to_label(fqdn, origin);
        Self::new(rtype, &short, origin, data)
    }

    /// Set `Name` and re-derive `NameFQDN`.
    pub fn set_label(&mut self, short: &str, origin: &str) {
        let short = if short.is_empty() { label::APEX } else { short };
        self.name_fqdn = label::name_to_fqdn(short, origin);
        self.name = label::fqdn_to_label(&self.name_fqdn, origin);
    }

    /// Builder-style TTL setter
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Builder-style metadata setter
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Builder-style provider handle setter
    pub fn with_original(mut self, original: ProviderHandle) -> Self {
        self.original = Some(original);
        self
    }

    /// Set a TXT payload from a single logical string, chunked to the wire limit.
    pub fn set_txt(&mut self, text: &str) {
        self.data = RecordData::Txt(txt::split_chunks(text));
    }

    /// Set a TXT payload from provider-supplied strings, re-chunked.
    pub fn set_txt_chunks<S: AsRef<str>>(&mut self, parts: &[S]) {
        self.data = RecordData::Txt(txt::normalize_chunks(parts));
    }

    /// The TXT value as one string, if this is a TXT payload.
    pub fn txt_joined(&self) -> Option<String> {
        match &self.data {
            RecordData::Txt(chunks) => Some(chunks.concat()),
            _ => None,
        }
    }

    /// Grouping key `(NameFQDN, Type)`
    pub fn key(&self) -> RecordKey {
        RecordKey {
            name_fqdn: self.name_fqdn.clone(),
            rtype: self.rtype.clone(),
        }
    }

    /// Whether this record sits at the zone apex
    pub fn is_apex(&self) -> bool {
        self.name == label::APEX
    }

    /// Metadata lookup
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}
