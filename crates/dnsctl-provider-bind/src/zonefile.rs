// # RFC-1035 zone files
//
// Parsing goes through the record-type registry: each line's rdata fields
// become raw positional arguments and are lowered exactly like records from
// the desired-state document, so both sides of a diff share one canonical
// form.
//
// Supported syntax: `$ORIGIN`, `$TTL`, `;` comments, parenthesized
// multi-line records, owner inheritance from the previous line, optional
// TTL and class in either order. `$INCLUDE` is rejected.

use chrono::NaiveDate;
use dnsctl_core::config::{RawArg, RawRecord};
use dnsctl_core::error::{Error, Result};
use dnsctl_core::lower::lower_record;
use dnsctl_core::models::{RecordConfig, RecordData};
use dnsctl_core::normalize::{fqdn_to_label, name_to_fqdn, split_fields, txt, unquote};
use dnsctl_core::rtype::{ArgKind, RTypeRegistry};
use serde::Deserialize;
use std::fmt::Write as _;

/// Start-of-authority values
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Soa {
    /// Primary nameserver, absolute
    pub mname: String,
    /// Responsible mailbox, absolute
    pub rname: String,
    /// Zone serial
    pub serial: u32,
    /// Refresh interval
    pub refresh: u32,
    /// Retry interval
    pub retry: u32,
    /// Expiry
    pub expire: u32,
    /// Negative-caching TTL
    pub minimum: u32,
    /// TTL of the SOA record itself
    pub ttl: u32,
}

impl Default for Soa {
    fn default() -> Self {
        Self {
            mname: "ns1.invalid.".to_string(),
            rname: "hostmaster.invalid.".to_string(),
            serial: 0,
            refresh: 3600,
            retry: 600,
            expire: 604_800,
            minimum: 1440,
            ttl: 300,
        }
    }
}

impl Soa {
    /// Defaults named after `origin` where the template left them unset
    pub fn for_zone(template: &Soa, origin: &str) -> Self {
        let mut soa = template.clone();
        if soa.mname == Soa::default().mname {
            soa.mname = format!("ns1.{origin}.");
        }
        if soa.rname == Soa::default().rname {
            soa.rname = format!("hostmaster.{origin}.");
        }
        soa
    }
}

/// Next serial in `YYYYMMDDnn` form, always greater than `previous`.
pub fn next_serial(previous: u32, today: NaiveDate) -> u32 {
    let date: u32 = today
        .format("%Y%m%d")
        .to_string()
        .parse()
        .unwrap_or_default();
    let base = date.saturating_mul(100);
    if previous >= base {
        previous.saturating_add(1)
    } else {
        base
    }
}

/// A parsed zone file
#[derive(Debug, Default)]
pub struct ZoneFile {
    /// The SOA record, if the file had one
    pub soa: Option<Soa>,
    /// Every other record
    pub records: Vec<RecordConfig>,
}

struct Entry {
    line: usize,
    indented: bool,
    fields: Vec<String>,
}

/// Join parenthesized continuations into one field list per record.
fn entries(text: &str) -> Result<Vec<Entry>> {
    let mut out = Vec::new();
    let mut pending: Option<Entry> = None;
    let mut depth = 0usize;

    for (i, line) in text.lines().enumerate() {
        let mut cleaned = Vec::new();
        for field in split_fields(line)? {
            if field.starts_with('"') {
                cleaned.push(field);
                continue;
            }
            depth += field.matches('(').count();
            let closes = field.matches(')').count();
            if closes > depth {
                return Err(Error::validation(format!("line {}: unbalanced ')'", i + 1)));
            }
            depth -= closes;
            let bare: String = field.chars().filter(|c| *c != '(' && *c != ')').collect();
            if !bare.is_empty() {
                cleaned.push(bare);
            }
        }

        match pending.as_mut() {
            Some(entry) => entry.fields.extend(cleaned),
            None => {
                pending = Some(Entry {
                    line: i + 1,
                    indented: line.starts_with(char::is_whitespace),
                    fields: cleaned,
                })
            }
        }
        if depth == 0 {
            if let Some(entry) = pending.take().filter(|e| !e.fields.is_empty()) {
                out.push(entry);
            }
        }
    }

    match pending {
        Some(entry) if depth > 0 => Err(Error::validation(format!(
            "line {}: unterminated '('",
            entry.line
        ))),
        _ => Ok(out),
    }
}

fn parse_u32(field: &str, what: &str, line: usize) -> Result<u32> {
    field
        .parse()
        .map_err(|_| Error::validation(format!("line {line}: invalid {what} {field:?}")))
}

fn is_class(field: &str) -> bool {
    matches!(field.to_ascii_uppercase().as_str(), "IN" | "CH" | "HS")
}

/// Build the raw payload for `signature` from rdata fields.
///
/// The last position absorbs any extra fields: as a list for `StrOrList`,
/// space-joined for `Str`.
fn payload(signature: &[ArgKind], rdata: &[String], line: usize) -> Result<Vec<RawArg>> {
    let Some((last, leading)) = signature.split_last() else {
        return Ok(Vec::new());
    };
    // A trailing free-form string may be absent (SVCB without parameters).
    let required = if *last == ArgKind::Str { leading.len() } else { signature.len() };
    if rdata.len() < required {
        return Err(Error::validation(format!(
            "line {line}: expected {} rdata fields, got {}",
            signature.len(),
            rdata.len()
        )));
    }
    let decode = |f: &String| {
        unquote(f).map_err(|e| Error::validation(format!("line {line}: {e}")))
    };
    let mut args = rdata[..leading.len()]
        .iter()
        .map(|f| decode(f).map(RawArg::Str))
        .collect::<Result<Vec<_>>>()?;
    let rest = &rdata[leading.len()..];
    args.push(match last {
        ArgKind::StrOrList => RawArg::List(rest.iter().map(decode).collect::<Result<_>>()?),
        ArgKind::Str => RawArg::Str(rest.iter().map(decode).collect::<Result<Vec<_>>>()?.join(" ")),
        ArgKind::Int if rest.len() == 1 => RawArg::Str(rest[0].clone()),
        ArgKind::Int => {
            return Err(Error::validation(format!("line {line}: trailing rdata fields")));
        }
    });
    Ok(args)
}

/// Parse zone-file text for `origin`.
pub fn parse(text: &str, origin: &str, registry: &RTypeRegistry) -> Result<ZoneFile> {
    let zone = origin.trim_end_matches('.').to_ascii_lowercase();
    let mut current_origin = zone.clone();
    let mut default_ttl: Option<u32> = None;
    let mut last_owner = zone.clone();
    let mut parsed = ZoneFile::default();

    for entry in entries(text)? {
        let line = entry.line;
        let fields = entry.fields;

        match fields[0].to_ascii_uppercase().as_str() {
            "$ORIGIN" => {
                let name = fields
                    .get(1)
                    .ok_or_else(|| Error::validation(format!("line {line}: $ORIGIN needs a name")))?;
                current_origin = name_to_fqdn(name, &current_origin);
                continue;
            }
            "$TTL" => {
                let ttl = fields
                    .get(1)
                    .ok_or_else(|| Error::validation(format!("line {line}: $TTL needs a value")))?;
                default_ttl = Some(parse_u32(ttl, "TTL", line)?);
                continue;
            }
            "$INCLUDE" => {
                return Err(Error::validation(format!("line {line}: $INCLUDE is not supported")));
            }
            _ => {}
        }

        let mut rest: &[String] = &fields;
        let owner = if entry.indented {
            last_owner.clone()
        } else {
            let owner = name_to_fqdn(&rest[0], &current_origin);
            rest = &rest[1..];
            owner
        };
        last_owner = owner.clone();

        let mut ttl = None;
        while let Some(field) = rest.first() {
            if ttl.is_none() && field.chars().all(|c| c.is_ascii_digit()) {
                ttl = Some(parse_u32(field, "TTL", line)?);
            } else if is_class(field) {
                if !field.eq_ignore_ascii_case("IN") {
                    return Err(Error::validation(format!("line {line}: only class IN is supported")));
                }
            } else {
                break;
            }
            rest = &rest[1..];
        }

        let (rtype, rdata) = rest
            .split_first()
            .ok_or_else(|| Error::validation(format!("line {line}: missing record type")))?;
        let rtype = rtype.to_ascii_uppercase();

        if rtype == "SOA" {
            if rdata.len() != 7 {
                return Err(Error::validation(format!("line {line}: SOA needs 7 fields")));
            }
            let n = |i: usize, what: &str| parse_u32(&rdata[i], what, line);
            parsed.soa = Some(Soa {
                mname: name_to_fqdn(&rdata[0], &current_origin) + ".",
                rname: name_to_fqdn(&rdata[1], &current_origin) + ".",
                serial: n(2, "serial")?,
                refresh: n(3, "refresh")?,
                retry: n(4, "retry")?,
                expire: n(5, "expire")?,
                minimum: n(6, "minimum")?,
                ttl: ttl.or(default_ttl).unwrap_or(Soa::default().ttl),
            });
            continue;
        }

        let handler = registry.lookup(&rtype)?;
        let args = payload(handler.signature(), rdata, line)?;
        let ttl = ttl
            .or(default_ttl)
            .or(parsed.soa.as_ref().map(|soa| soa.minimum))
            .unwrap_or(dnsctl_core::models::record::DEFAULT_TTL);

        // Lower relative to the current $ORIGIN, then re-home into the zone.
        let raw = RawRecord::new(&rtype, fqdn_to_label(&owner, &current_origin), args).with_ttl(ttl);
        let mut rc = lower_record(&raw, &current_origin, registry)?;
        let short = fqdn_to_label(&rc.name_fqdn, &zone);
        rc.set_label(&short, &zone);
        parsed.records.push(rc);
    }

    Ok(parsed)
}

fn rdata(rc: &RecordConfig) -> String {
    match &rc.data {
        // One quoted string per chunk, space separated
        RecordData::Txt(chunks) => chunks.iter().map(|c| txt::quote(c)).collect::<Vec<_>>().join(" "),
        data => data.to_string(),
    }
}

fn sort_key(rc: &RecordConfig) -> (Vec<String>, String, String) {
    let labels = rc.name_fqdn.rsplit('.').map(str::to_string).collect();
    (labels, rc.rtype.clone(), rdata(rc))
}

/// Render a complete zone file for `origin`.
pub fn render(origin: &str, soa: &Soa, records: &[RecordConfig]) -> String {
    let origin = origin.trim_end_matches('.');
    let mut sorted: Vec<&RecordConfig> = records.iter().collect();
    sorted.sort_by_key(|rc| sort_key(rc));

    let mut out = String::new();
    let _ = writeln!(out, "$ORIGIN {origin}.");
    let _ = writeln!(out, "$TTL {}", soa.ttl);
    let _ = writeln!(
        out,
        "@ {} IN SOA {} {} {} {} {} {} {}",
        soa.ttl, soa.mname, soa.rname, soa.serial, soa.refresh, soa.retry, soa.expire, soa.minimum
    );
    for rc in sorted {
        let _ = writeln!(out, "{:<30} {:<6} IN {:<6} {}", rc.name, rc.ttl, rc.rtype, rdata(rc));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const ZONE: &str = r#"
$ORIGIN example.com.
$TTL 600
@   IN SOA ns1.example.com. hostmaster.example.com. (
        2026101900 ; serial
        3600 600 604800 1440 )
@        300 IN A     192.0.2.1
         IN MX  10 mx1
www      IN CNAME @
txt      IN TXT  "v=spf1 " "-all" ; trailing comment
$ORIGIN lab.example.com.
host     60 IN AAAA 2001:db8::1
_sip._tcp IN SRV 10 60 5060 sip.example.com.
@        IN CAA 0 issue "letsencrypt.org"
"#;

    fn registry() -> RTypeRegistry {
        RTypeRegistry::with_builtins().unwrap()
    }

    #[test]
    fn parses_directives_and_continuations() {
        let zone = parse(ZONE, "example.com", &registry()).unwrap();
        let soa = zone.soa.unwrap();
        assert_eq!(soa.serial, 2026101900);
        assert_eq!(soa.minimum, 1440);

        let r = &zone.records;
        assert_eq!(r.len(), 7);
        assert_eq!(r[0].data, RecordData::A(Ipv4Addr::new(192, 0, 2, 1)));
        assert_eq!(r[0].ttl, 300);
        // Owner inherited from the previous line
        assert_eq!(r[1].name, "@");
        assert_eq!(r[1].data.target_name(), Some("mx1.example.com."));
        assert_eq!(r[1].ttl, 600);
        assert_eq!(r[2].data.target_name(), Some("example.com."));
        assert_eq!(r[3].txt_joined().as_deref(), Some("v=spf1 -all"));
        assert_eq!(r[4].name, "host.lab");
        assert_eq!(r[4].ttl, 60);
        assert_eq!(r[5].name, "_sip._tcp.lab");
        assert_eq!(r[6].name, "lab");
    }

    #[test]
    fn render_then_parse_is_stable() {
        let registry = registry();
        let mut zone = parse(ZONE, "example.com", &registry).unwrap();
        let mut multiline = RecordConfig::new("TXT", "notes", "example.com", RecordData::Txt(vec![]))
            .with_ttl(300);
        multiline.set_txt_chunks(&["line1\nline2", "tab\there\u{7f}"]);
        zone.records.push(multiline.clone());
        let soa = zone.soa.clone().unwrap();
        let text = render("example.com", &soa, &zone.records);
        assert!(text.lines().any(|l| l.contains(r#""line1\010line2tab\009here\127""#)));

        let again = parse(&text, "example.com", &registry).unwrap();
        assert_eq!(again.soa, Some(soa));
        assert_eq!(again.records.len(), zone.records.len());
        for rc in &zone.records {
            assert!(
                again.records.iter().any(|o| o.key() == rc.key()
                    && o.ttl == rc.ttl
                    && registry.comparable(o) == registry.comparable(rc)),
                "{} {} lost in {}",
                rc.rtype,
                rc.name,
                text
            );
        }
        assert_eq!(render("example.com", again.soa.as_ref().unwrap(), &again.records), text);
        let notes = again.records.iter().find(|r| r.name == "notes").unwrap();
        assert_eq!(notes.data, multiline.data);
    }

    #[test]
    fn malformed_input_is_rejected() {
        let registry = registry();
        assert!(parse("@ IN SOA a. b. ( 1 2 3", "example.com", &registry).is_err());
        assert!(parse("$INCLUDE other.zone", "example.com", &registry).is_err());
        assert!(parse("@ IN BOGUS x", "example.com", &registry).is_err());
        assert!(parse("@ IN MX 10", "example.com", &registry).is_err());
        assert!(parse("@ CH A 192.0.2.1", "example.com", &registry).is_err());
    }

    #[test]
    fn serials_are_date_based_and_monotonic() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(next_serial(0, day), 2026101900);
        assert_eq!(next_serial(2026101900, day), 2026101901);
        assert_eq!(next_serial(2026101999, day), 2026102000);
        assert_eq!(next_serial(2025010100, day), 2026101900);
    }
}
