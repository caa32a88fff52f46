//! Raw → typed lowering
//!
//! Turns the interpreter's untyped record tuples into [`RecordConfig`]s:
//!
//! 1. apply the extension-scope subdomain to the label
//! 2. derive the FQDN
//! 3. stringify metadata
//! 4. check and coerce the payload against the handler's signature
//! 5. dispatch to the handler's `from_raw`
//! 6. route `ensure_absent` tuples to [`DomainConfig::ensure_absent`]
//!
//! Any failure is fatal for the domain; nothing is lowered partially.

use std::collections::BTreeMap;

use crate::config::{RawArg, RawRecord};
use crate::error::{Error, Result};
use crate::models::{DomainConfig, RecordConfig, RecordData};
use crate::normalize::label;
use crate::rtype::{ArgKind, RTypeRegistry};

/// Lower every raw tuple of `dc`, then release the raw storage.
pub fn lower_domain(dc: &mut DomainConfig, registry: &RTypeRegistry) -> Result<()> {
    let raws = std::mem::take(&mut dc.raw_records);
    let lowered: Result<Vec<(bool, RecordConfig)>> = raws
        .iter()
        .map(|raw| Ok((raw.ensure_absent, lower_record(raw, &dc.name, registry)?)))
        .collect();

    let lowered = match lowered {
        Ok(lowered) => lowered,
        Err(e) => {
            dc.raw_records = raws;
            return Err(e);
        }
    };

    tracing::debug!("Lowered {} records for {}", lowered.len(), dc.name);
    for (absent, rc) in lowered {
        if absent {
            dc.ensure_absent.push(rc);
        } else {
            dc.records.push(rc);
        }
    }
    dc.raw_records = Vec::new();
    Ok(())
}

/// Lower one raw tuple within zone `origin`.
pub fn lower_record(raw: &RawRecord, origin: &str, registry: &RTypeRegistry) -> Result<RecordConfig> {
    let rtype = raw.rtype.to_ascii_uppercase();
    let handler = registry.lookup(&rtype)?;

    let (first, payload) = raw
        .args
        .split_first()
        .ok_or_else(|| Error::lowering(&rtype, "", origin, Error::validation("missing label")))?;
    let short = match first {
        RawArg::Str(s) => s.clone(),
        RawArg::Int(n) => n.to_string(),
        other => {
            return Err(Error::lowering(
                &rtype,
                other.to_string(),
                origin,
                Error::validation(format!("label must be a string, got {}", other.kind_name())),
            ));
        }
    };
    let wrap = |e: Error| Error::lowering(&rtype, &short, origin, e);

    let scoped = label::apply_subdomain(&short, &raw.subdomain);
    let ascii = label::to_ascii(&scoped).map_err(wrap)?;

    let mut rc = RecordConfig::new(&rtype, &ascii, origin, RecordData::Fields(Vec::new()));
    rc.ttl = raw.ttl;
    rc.subdomain = raw.subdomain.clone();
    rc.metadata = render_meta(&raw.meta);

    let args = coerce_args(handler.signature(), payload).map_err(wrap)?;
    let meta = rc.metadata.clone();
    handler.from_raw(&mut rc, origin, &args, &meta).map_err(wrap)?;
    Ok(rc)
}

fn render_meta(meta: &BTreeMap<String, serde_json::Value>) -> BTreeMap<String, String> {
    meta.iter()
        .map(|(k, v)| {
            let rendered = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), rendered)
        })
        .collect()
}

/// Check payload arity and kinds, coercing where the conversion is lossless.
pub fn coerce_args(signature: &[ArgKind], payload: &[RawArg]) -> Result<Vec<RawArg>> {
    if signature.len() != payload.len() {
        return Err(Error::validation(format!(
            "expected {} arguments after the label, got {}",
            signature.len(),
            payload.len()
        )));
    }
    signature
        .iter()
        .zip(payload)
        .enumerate()
        .map(|(i, (kind, arg))| coerce(*kind, arg).ok_or_else(|| mismatch(i, *kind, arg)))
        .collect()
}

fn coerce(kind: ArgKind, arg: &RawArg) -> Option<RawArg> {
    match (kind, arg) {
        (ArgKind::Int, RawArg::Int(n)) => Some(RawArg::Int(*n)),
        (ArgKind::Int, RawArg::Float(x)) if x.fract() == 0.0 && x.abs() < 9.0e15 => {
            Some(RawArg::Int(*x as i64))
        }
        (ArgKind::Int, RawArg::Str(s)) => s.trim().parse().ok().map(RawArg::Int),
        (ArgKind::Str, RawArg::Str(s)) => Some(RawArg::Str(s.clone())),
        (ArgKind::Str, RawArg::Int(n)) => Some(RawArg::Str(n.to_string())),
        (ArgKind::StrOrList, RawArg::Str(s)) => Some(RawArg::List(vec![s.clone()])),
        (ArgKind::StrOrList, RawArg::List(items)) => Some(RawArg::List(items.clone())),
        _ => None,
    }
}

fn mismatch(i: usize, kind: ArgKind, arg: &RawArg) -> Error {
    let expected = match kind {
        ArgKind::Str => "string",
        ArgKind::Int => "integer",
        ArgKind::StrOrList => "string or list",
    };
    Error::validation(format!(
        "argument {} must be {}, got {} {:?}",
        i + 2,
        expected,
        arg.kind_name(),
        arg.to_string()
    ))
}
