// Hex-payload types: TLSA and DS.

use std::collections::BTreeMap;

use super::{ArgKind, RTypeHandler, RTypeRegistry, arg_int, arg_str, is_hex};
use crate::audit::AuditIssue;
use crate::config::RawArg;
use crate::error::{Error, Result};
use crate::models::{RecordConfig, RecordData};
use crate::providers::Capability;

pub(super) fn register(registry: &mut RTypeRegistry) -> Result<()> {
    registry.register(Tlsa)?;
    registry.register(Ds)
}

fn hex_arg(args: &[RawArg], i: usize, what: &str) -> Result<String> {
    let value: String = arg_str(args, i)?
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    if !is_hex(&value) {
        return Err(Error::validation(format!("{what} must be hexadecimal")));
    }
    Ok(value)
}

struct Tlsa;

impl RTypeHandler for Tlsa {
    fn name(&self) -> &str {
        "TLSA"
    }

    fn signature(&self) -> &[ArgKind] {
        &[ArgKind::Int, ArgKind::Int, ArgKind::Int, ArgKind::Str]
    }

    fn from_raw(
        &self,
        rc: &mut RecordConfig,
        _origin: &str,
        args: &[RawArg],
        _meta: &BTreeMap<String, String>,
    ) -> Result<()> {
        rc.data = RecordData::Tlsa {
            usage: arg_int(args, 0, "TLSA usage")?,
            selector: arg_int(args, 1, "TLSA selector")?,
            matching_type: arg_int(args, 2, "TLSA matching type")?,
            certificate: hex_arg(args, 3, "TLSA certificate data")?,
        };
        Ok(())
    }

    fn audit(&self, rc: &RecordConfig) -> Vec<AuditIssue> {
        let RecordData::Tlsa {
            usage,
            selector,
            matching_type,
            ..
        } = &rc.data
        else {
            return vec![AuditIssue::error(rc, "TLSA record without TLSA data")];
        };
        let mut issues = Vec::new();
        if *usage > 3 {
            issues.push(AuditIssue::error(rc, format!("TLSA usage {usage} is not 0-3")));
        }
        if *selector > 1 {
            issues.push(AuditIssue::error(rc, format!("TLSA selector {selector} is not 0-1")));
        }
        if *matching_type > 2 {
            issues.push(AuditIssue::error(
                rc,
                format!("TLSA matching type {matching_type} is not 0-2"),
            ));
        }
        issues
    }

    fn capability(&self) -> Option<Capability> {
        Some(Capability::CanUseTlsa)
    }
}

struct Ds;

impl RTypeHandler for Ds {
    fn name(&self) -> &str {
        "DS"
    }

    fn signature(&self) -> &[ArgKind] {
        &[ArgKind::Int, ArgKind::Int, ArgKind::Int, ArgKind::Str]
    }

    fn from_raw(
        &self,
        rc: &mut RecordConfig,
        _origin: &str,
        args: &[RawArg],
        _meta: &BTreeMap<String, String>,
    ) -> Result<()> {
        rc.data = RecordData::Ds {
            key_tag: arg_int(args, 0, "DS key tag")?,
            algorithm: arg_int(args, 1, "DS algorithm")?,
            digest_type: arg_int(args, 2, "DS digest type")?,
            digest: hex_arg(args, 3, "DS digest")?,
        };
        Ok(())
    }

    fn audit(&self, rc: &RecordConfig) -> Vec<AuditIssue> {
        if rc.is_apex() {
            vec![AuditIssue::error(rc, "DS records belong to child delegations, not the apex")]
        } else {
            Vec::new()
        }
    }

    fn capability(&self) -> Option<Capability> {
        Some(Capability::CanUseDs)
    }
}
