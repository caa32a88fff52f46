// SVCB and HTTPS share a payload shape: priority, target, params.

use std::collections::BTreeMap;

use super::{ArgKind, RTypeHandler, RTypeRegistry, arg_int, arg_str, qualify_target};
use crate::audit::AuditIssue;
use crate::config::RawArg;
use crate::error::{Error, Result};
use crate::models::{RecordConfig, RecordData};
use crate::providers::Capability;

pub(super) fn register(registry: &mut RTypeRegistry) -> Result<()> {
    registry.register(Svcb {
        name: "SVCB",
        capability: Capability::CanUseSvcb,
    })?;
    registry.register(Svcb {
        name: "HTTPS",
        capability: Capability::CanUseHttps,
    })
}

struct Svcb {
    name: &'static str,
    capability: Capability,
}

/// Normalize whitespace and key case in a `key=value` parameter list.
fn normalize_params(params: &str) -> Result<String> {
    params
        .split_whitespace()
        .map(|param| match param.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                Ok(format!("{}={}", key.to_ascii_lowercase(), value))
            }
            Some(_) => Err(Error::validation(format!("invalid SVCB parameter {param:?}"))),
            None => Ok(param.to_ascii_lowercase()),
        })
        .collect::<Result<Vec<_>>>()
        .map(|params| params.join(" "))
}

impl RTypeHandler for Svcb {
    fn name(&self) -> &str {
        self.name
    }

    fn signature(&self) -> &[ArgKind] {
        &[ArgKind::Int, ArgKind::Str, ArgKind::Str]
    }

    fn from_raw(
        &self,
        rc: &mut RecordConfig,
        origin: &str,
        args: &[RawArg],
        _meta: &BTreeMap<String, String>,
    ) -> Result<()> {
        rc.data = RecordData::Svcb {
            priority: arg_int(args, 0, "SVCB priority")?,
            target: qualify_target(arg_str(args, 1)?, origin)?,
            params: normalize_params(arg_str(args, 2)?)?,
        };
        Ok(())
    }

    fn audit(&self, rc: &RecordConfig) -> Vec<AuditIssue> {
        match &rc.data {
            RecordData::Svcb {
                priority: 0,
                params,
                ..
            } if !params.is_empty() => vec![AuditIssue::warning(
                rc,
                "alias-mode (priority 0) record carries parameters",
            )],
            _ => Vec::new(),
        }
    }

    fn capability(&self) -> Option<Capability> {
        Some(self.capability)
    }
}
