// Single-target types: CNAME, NS, PTR, ALIAS.

use std::collections::BTreeMap;

use super::{ArgKind, RTypeHandler, RTypeRegistry, arg_str, qualify_target};
use crate::audit::AuditIssue;
use crate::config::RawArg;
use crate::error::Result;
use crate::models::{RecordConfig, RecordData};
use crate::providers::Capability;

pub(super) fn register(registry: &mut RTypeRegistry) -> Result<()> {
    registry.register(TargetType {
        name: "CNAME",
        capability: None,
    })?;
    registry.register(TargetType {
        name: "NS",
        capability: None,
    })?;
    registry.register(TargetType {
        name: "PTR",
        capability: Some(Capability::CanUsePtr),
    })?;
    registry.register(TargetType {
        name: "ALIAS",
        capability: Some(Capability::CanUseAlias),
    })
}

struct TargetType {
    name: &'static str,
    capability: Option<Capability>,
}

impl RTypeHandler for TargetType {
    fn name(&self) -> &str {
        self.name
    }

    fn signature(&self) -> &[ArgKind] {
        &[ArgKind::Str]
    }

    fn from_raw(
        &self,
        rc: &mut RecordConfig,
        origin: &str,
        args: &[RawArg],
        _meta: &BTreeMap<String, String>,
    ) -> Result<()> {
        rc.data = RecordData::Target(qualify_target(arg_str(args, 0)?, origin)?);
        Ok(())
    }

    fn audit(&self, rc: &RecordConfig) -> Vec<AuditIssue> {
        let mut issues = Vec::new();
        let target = rc.data.target_name().unwrap_or_default();
        if target == "." {
            issues.push(AuditIssue::error(rc, "target cannot be the root"));
        }
        match self.name {
            "CNAME" => {
                if rc.is_apex() {
                    issues.push(AuditIssue::error(rc, "CNAME at apex (@) not allowed"));
                }
                if target.trim_end_matches('.') == rc.name_fqdn {
                    issues.push(AuditIssue::error(rc, "CNAME points at itself"));
                }
            }
            _ => {}
        }
        issues
    }

    fn capability(&self) -> Option<Capability> {
        self.capability
    }
}
