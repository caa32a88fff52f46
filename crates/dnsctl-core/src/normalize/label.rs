// # Labels and FQDNs
//
// In-memory names are lowercase, ASCII (punycode for IDNs) and carry no
// trailing dot. The apex is written `@` in short form.
//
// Record *targets* are a different story: they keep whatever trailing dot
// the provider expects, so only names go through this module.

use crate::error::{Error, Result};

/// Short label for the zone apex
pub const APEX: &str = "@";

/// Convert a short label to an FQDN within `origin`.
///
/// - `@` maps to the origin itself
/// - a label with a trailing dot is already absolute and only loses the dot
/// - anything else is suffixed with the origin
pub fn name_to_fqdn(label: &str, origin: &str) -> String {
    let origin = origin.trim_end_matches('.').to_ascii_lowercase();
    if label == APEX || label.is_empty() {
        return origin;
    }
    if let Some(absolute) = label.strip_suffix('.') {
        return absolute.to_ascii_lowercase();
    }
    format!("{}.{}", label.to_ascii_lowercase(), origin)
}

/// Convert an FQDN back to its short label within `origin`.
///
/// Names outside the origin are returned absolute (with a trailing dot) so
/// that the conversion round-trips through [`name_to_fqdn`].
pub fn fqdn_to_label(fqdn: &str, origin: &str) -> String {
    let fqdn = fqdn.trim_end_matches('.').to_ascii_lowercase();
    let origin = origin.trim_end_matches('.').to_ascii_lowercase();
    if fqdn == origin {
        return APEX.to_string();
    }
    match fqdn.strip_suffix(&format!(".{origin}")) {
        Some(short) => short.to_string(),
        None => format!("{fqdn}."),
    }
}

/// Apply an extension-scope subdomain to a label.
pub fn apply_subdomain(label: &str, subdomain: &str) -> String {
    if subdomain.is_empty() {
        label.to_string()
    } else if label == APEX {
        subdomain.to_string()
    } else {
        format!("{label}.{subdomain}")
    }
}

/// Encode a (possibly Unicode) name as ASCII, lowercased.
///
/// Pure ASCII input is only lowercased, so `_service` and `*` labels pass
/// through untouched.
pub fn to_ascii(name: &str) -> Result<String> {
    if name.is_ascii() {
        return Ok(name.to_ascii_lowercase());
    }
    let trailing_dot = name.ends_with('.');
    let encoded = idna::domain_to_ascii(name.trim_end_matches('.'))
        .map_err(|_| Error::validation(format!("invalid internationalized name: {name}")))?;
    Ok(if trailing_dot {
        format!("{encoded}.")
    } else {
        encoded
    })
}

/// Add a trailing dot if absent.
pub fn ensure_trailing_dot(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

/// Whether a short label carries a wildcard somewhere other than the leftmost label.
pub fn has_misplaced_wildcard(label: &str) -> bool {
    label
        .split('.')
        .enumerate()
        .any(|(i, part)| part.contains('*') && (i > 0 || part != "*"))
}
