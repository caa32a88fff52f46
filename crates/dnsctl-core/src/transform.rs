//! IPv4 address transforms
//!
//! A transform table maps address ranges onto either a shifted base or a
//! fixed list of addresses:
//!
//! ```text
//! low~high~newBase~newIPs;low~high~newBase~newIPs;...
//! ```
//!
//! `newIPs` is comma separated. Exactly one of `newBase` and `newIPs` is set
//! per row. A records carrying the `transform` metadata key are rewritten
//! through their table by [`apply_transforms`].

use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::models::{DomainConfig, RecordData};

/// Metadata key holding a transform table on an A record
pub const TRANSFORM_META: &str = "transform";

/// One row of a transform table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpConversion {
    /// First address of the range
    pub low: Ipv4Addr,
    /// Last address of the range, inclusive
    pub high: Ipv4Addr,
    /// Replacement
    pub target: ConversionTarget,
}

/// What a matching address turns into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionTarget {
    /// `base + (addr - low)`
    Base(Ipv4Addr),
    /// Every listed address
    List(Vec<Ipv4Addr>),
}

fn parse_ip(field: &str) -> Result<Ipv4Addr> {
    field
        .trim()
        .parse()
        .map_err(|_| Error::transform(format!("invalid IPv4 address {field:?}")))
}

/// Parse a transform table.
pub fn decode_transform_table(text: &str) -> Result<Vec<IpConversion>> {
    text.split(';')
        .filter(|row| !row.trim().is_empty())
        .map(|row| {
            let fields: Vec<&str> = row.split('~').collect();
            let [low, high, base, ips] = fields.as_slice() else {
                return Err(Error::transform(format!(
                    "row {row:?} must have 4 fields separated by '~', found {}",
                    fields.len()
                )));
            };
            let low = parse_ip(low)?;
            let high = parse_ip(high)?;
            if u32::from(low) > u32::from(high) {
                return Err(Error::transform(format!("range {low}-{high} is reversed")));
            }
            let target = match (base.trim().is_empty(), ips.trim().is_empty()) {
                (false, true) => ConversionTarget::Base(parse_ip(base)?),
                (true, false) => ConversionTarget::List(
                    ips.split(',').map(parse_ip).collect::<Result<Vec<_>>>()?,
                ),
                _ => {
                    return Err(Error::transform(format!(
                        "row {row:?} must set exactly one of newBase or newIPs"
                    )));
                }
            };
            Ok(IpConversion { low, high, target })
        })
        .collect()
}

/// Transform `addr` by the first matching rule; unmatched addresses pass through.
pub fn transform_ip_to_list(addr: Ipv4Addr, rules: &[IpConversion]) -> Result<Vec<Ipv4Addr>> {
    let value = u32::from(addr);
    let Some(rule) = rules
        .iter()
        .find(|r| u32::from(r.low) <= value && value <= u32::from(r.high))
    else {
        return Ok(vec![addr]);
    };
    match &rule.target {
        ConversionTarget::List(ips) => Ok(ips.clone()),
        ConversionTarget::Base(base) => u32::from(*base)
            .checked_add(value - u32::from(rule.low))
            .map(|shifted| vec![Ipv4Addr::from(shifted)])
            .ok_or_else(|| Error::transform(format!("{addr} shifted past 255.255.255.255"))),
    }
}

/// Transform `addr` to exactly one address; expansion is an error.
pub fn transform_ip(addr: Ipv4Addr, rules: &[IpConversion]) -> Result<Ipv4Addr> {
    match transform_ip_to_list(addr, rules)?.as_slice() {
        [single] => Ok(*single),
        many => Err(Error::transform(format!(
            "{addr} expands to {} addresses",
            many.len()
        ))),
    }
}

/// Rewrite A records that carry a `transform` table.
///
/// An expanding rule yields one record per new address. The metadata key is
/// dropped from the rewritten records.
pub fn apply_transforms(dc: &mut DomainConfig) -> Result<()> {
    if !dc.records.iter().any(|rc| rc.meta(TRANSFORM_META).is_some()) {
        return Ok(());
    }
    let mut out = Vec::with_capacity(dc.records.len());
    for mut rc in std::mem::take(&mut dc.records) {
        let Some(table) = rc.metadata.remove(TRANSFORM_META) else {
            out.push(rc);
            continue;
        };
        let RecordData::A(addr) = rc.data else {
            return Err(Error::transform(format!(
                "{} carries a transform but is not an A record",
                rc.key()
            )));
        };
        let rules = decode_transform_table(&table)?;
        let ips = transform_ip_to_list(addr, &rules)?;
        tracing::debug!("Transformed {} {} into {:?}", rc.key(), addr, ips);
        for ip in ips {
            let mut copy = rc.clone();
            copy.data = RecordData::A(ip);
            out.push(copy);
        }
    }
    dc.records = out;
    Ok(())
}
