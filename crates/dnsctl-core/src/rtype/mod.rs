//! Record-type registry
//!
//! Maps record-type names to handlers that lift raw interpreter tuples into
//! typed [`RecordConfig`]s, audit them, and render their canonical and
//! display forms.
//!
//! ## Registration
//!
//! Each record-type kind exposes a `register` function. Vendor crates do the
//! same for their own types:
//!
//! ```rust,ignore
//! let mut registry = RTypeRegistry::with_builtins()?;
//! dnsctl_provider_cloudflare::register_rtypes(&mut registry)?;
//! dnsctl_core::rtype::install(registry)?;
//! ```
//!
//! After [`install`] (or the first call to [`global`]) the process-wide
//! registry is frozen; lookups are plain reads of an immutable map.

mod address;
mod caa;
mod dnssec;
mod mx;
mod srv;
mod svcb;
mod target;
mod txt;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

use crate::audit::AuditIssue;
use crate::config::RawArg;
use crate::error::{Error, Result};
use crate::models::RecordConfig;
use crate::normalize::label;
use crate::providers::Capability;

/// Expected kind of one positional payload argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// A string
    Str,
    /// An integer; integral floats and numeric strings coerce
    Int,
    /// A string or a list of strings; a lone string becomes a one-item list
    StrOrList,
}

/// Handler for one record type
///
/// `from_raw` receives the payload arguments (label excluded) already checked
/// against [`RTypeHandler::signature`] and coerced, so `Int` positions hold
/// [`RawArg::Int`] and `StrOrList` positions hold [`RawArg::List`].
pub trait RTypeHandler: Send + Sync {
    /// Uppercase type token
    fn name(&self) -> &str;

    /// Payload argument kinds, label excluded
    fn signature(&self) -> &[ArgKind];

    /// Populate `rc.data` (and anything else type-specific) from raw arguments.
    fn from_raw(
        &self,
        rc: &mut RecordConfig,
        origin: &str,
        args: &[RawArg],
        meta: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Provider-independent structural checks.
    fn audit(&self, _rc: &RecordConfig) -> Vec<AuditIssue> {
        Vec::new()
    }

    /// Canonical string used for equality.
    fn comparable(&self, rc: &RecordConfig) -> String {
        rc.data.to_string()
    }

    /// Human-readable rendering for diff messages.
    fn display(&self, rc: &RecordConfig) -> String {
        self.comparable(rc)
    }

    /// Provider capability required to publish this type, if any
    fn capability(&self) -> Option<Capability> {
        None
    }

    /// Provider type this vendor record type is restricted to, if any
    fn provider_only(&self) -> Option<&str> {
        None
    }
}

/// Dispatch table of record-type handlers
#[derive(Default, Clone)]
pub struct RTypeRegistry {
    handlers: HashMap<String, Arc<dyn RTypeHandler>>,
}

impl RTypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in record type
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        address::register(&mut registry)?;
        target::register(&mut registry)?;
        mx::register(&mut registry)?;
        txt::register(&mut registry)?;
        srv::register(&mut registry)?;
        caa::register(&mut registry)?;
        dnssec::register(&mut registry)?;
        svcb::register(&mut registry)?;
        Ok(registry)
    }

    /// Register a handler under its name
    ///
    /// Fails with [`Error::DuplicateType`] if the name is taken.
    pub fn register(&mut self, handler: impl RTypeHandler + 'static) -> Result<()> {
        let name = handler.name().to_ascii_uppercase();
        if self.handlers.contains_key(&name) {
            return Err(Error::DuplicateType(name));
        }
        tracing::trace!("Registered record type {}", name);
        self.handlers.insert(name, Arc::new(handler));
        Ok(())
    }

    /// Look up a handler by type name (case-insensitive)
    pub fn lookup(&self, name: &str) -> Result<&dyn RTypeHandler> {
        self.handlers
            .get(&name.to_ascii_uppercase())
            .map(AsRef::as_ref)
            .ok_or_else(|| Error::UnknownRecordType(name.to_string()))
    }

    /// Check if a type is registered
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(&name.to_ascii_uppercase())
    }

    /// Registered type names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Canonical form of a record, via its handler when registered
    pub fn comparable(&self, rc: &RecordConfig) -> String {
        match self.lookup(&rc.rtype) {
            Ok(handler) => handler.comparable(rc),
            Err(_) => rc.data.to_string(),
        }
    }

    /// Display form of a record, via its handler when registered
    pub fn display(&self, rc: &RecordConfig) -> String {
        match self.lookup(&rc.rtype) {
            Ok(handler) => handler.display(rc),
            Err(_) => rc.data.to_string(),
        }
    }
}

static GLOBAL: OnceLock<RTypeRegistry> = OnceLock::new();

/// Freeze `registry` as the process-wide registry.
///
/// Fails if the global registry was already installed or read.
pub fn install(registry: RTypeRegistry) -> Result<()> {
    GLOBAL
        .set(registry)
        .map_err(|_| Error::config("record type registry is already frozen"))
}

/// The process-wide registry; built-ins only unless [`install`] ran first.
pub fn global() -> &'static RTypeRegistry {
    GLOBAL.get_or_init(|| {
        RTypeRegistry::with_builtins().expect("built-in record types have unique names")
    })
}

// Argument helpers shared by the handlers. Positions were checked against
// the signature already, so a mismatch here is a handler bug surfaced as an
// error rather than a panic.

pub(crate) fn arg_str(args: &[RawArg], i: usize) -> Result<&str> {
    match args.get(i) {
        Some(RawArg::Str(s)) => Ok(s),
        other => Err(Error::validation(format!(
            "argument {} must be a string, got {:?}",
            i + 1,
            other
        ))),
    }
}

pub(crate) fn arg_list(args: &[RawArg], i: usize) -> Result<&[String]> {
    match args.get(i) {
        Some(RawArg::List(items)) => Ok(items),
        other => Err(Error::validation(format!(
            "argument {} must be a list of strings, got {:?}",
            i + 1,
            other
        ))),
    }
}

pub(crate) fn arg_int<T: TryFrom<i64>>(args: &[RawArg], i: usize, what: &str) -> Result<T> {
    match args.get(i) {
        Some(RawArg::Int(n)) => T::try_from(*n)
            .map_err(|_| Error::validation(format!("{what} out of range: {n}"))),
        other => Err(Error::validation(format!(
            "{what} must be an integer, got {other:?}"
        ))),
    }
}

/// Qualify a host-name target against `origin`, keeping a trailing dot.
///
/// `@` is the origin; a dotted name is absolute; `.` is the null target.
pub(crate) fn qualify_target(target: &str, origin: &str) -> Result<String> {
    let target = target.trim();
    if target.is_empty() {
        return Err(Error::validation("target cannot be empty"));
    }
    if target == "." {
        return Ok(".".to_string());
    }
    let origin = origin.trim_end_matches('.');
    let ascii = label::to_ascii(target)?;
    Ok(if ascii == label::APEX {
        format!("{}.", origin.to_ascii_lowercase())
    } else if ascii.ends_with('.') {
        ascii
    } else {
        format!("{}.{}.", ascii, origin.to_ascii_lowercase())
    })
}

pub(crate) fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordData;

    struct Dummy;

    impl RTypeHandler for Dummy {
        fn name(&self) -> &str {
            "DUMMY"
        }

        fn signature(&self) -> &[ArgKind] {
            &[ArgKind::Str]
        }

        fn from_raw(
            &self,
            rc: &mut RecordConfig,
            _origin: &str,
            args: &[RawArg],
            _meta: &BTreeMap<String, String>,
        ) -> Result<()> {
            rc.data = RecordData::Fields(vec![arg_str(args, 0)?.to_string()]);
            Ok(())
        }
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = RTypeRegistry::new();
        registry.register(Dummy).unwrap();
        let err = registry.register(Dummy).unwrap_err();
        assert!(matches!(err, Error::DuplicateType(ref n) if n == "DUMMY"));
    }

    #[test]
    fn lookup_is_case_insensitive_and_reports_unknown() {
        let registry = RTypeRegistry::with_builtins().unwrap();
        assert_eq!(registry.lookup("mx").unwrap().name(), "MX");
        assert!(matches!(
            registry.lookup("NOPE"),
            Err(Error::UnknownRecordType(_))
        ));
    }

    #[test]
    fn builtins_cover_common_types() {
        let registry = RTypeRegistry::with_builtins().unwrap();
        for name in [
            "A", "AAAA", "CNAME", "NS", "PTR", "ALIAS", "MX", "TXT", "SRV", "CAA", "TLSA", "DS",
            "SVCB", "HTTPS",
        ] {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[test]
    fn builtin_registration_twice_is_rejected() {
        let mut registry = RTypeRegistry::with_builtins().unwrap();
        assert!(matches!(
            mx::register(&mut registry),
            Err(Error::DuplicateType(_))
        ));
    }

    #[test]
    fn target_qualification() {
        assert_eq!(qualify_target("@", "example.com").unwrap(), "example.com.");
        assert_eq!(qualify_target("www", "example.com").unwrap(), "www.example.com.");
        assert_eq!(qualify_target("Other.NET.", "example.com").unwrap(), "other.net.");
        assert_eq!(qualify_target(".", "example.com").unwrap(), ".");
        assert!(qualify_target("", "example.com").is_err());
    }

    #[test]
    fn global_registry_is_frozen_after_first_read() {
        let registry = global();
        assert!(registry.contains("A"));
        assert!(install(RTypeRegistry::new()).is_err());
    }
}
