use std::collections::BTreeMap;

use super::{ArgKind, RTypeHandler, RTypeRegistry, arg_int, arg_str, qualify_target};
use crate::audit::AuditIssue;
use crate::config::RawArg;
use crate::error::Result;
use crate::models::{RecordConfig, RecordData};
use crate::providers::Capability;

pub(super) fn register(registry: &mut RTypeRegistry) -> Result<()> {
    registry.register(Srv)
}

struct Srv;

impl RTypeHandler for Srv {
    fn name(&self) -> &str {
        "SRV"
    }

    fn signature(&self) -> &[ArgKind] {
        &[ArgKind::Int, ArgKind::Int, ArgKind::Int, ArgKind::Str]
    }

    fn from_raw(
        &self,
        rc: &mut RecordConfig,
        origin: &str,
        args: &[RawArg],
        _meta: &BTreeMap<String, String>,
    ) -> Result<()> {
        rc.data = RecordData::Srv {
            priority: arg_int(args, 0, "SRV priority")?,
            weight: arg_int(args, 1, "SRV weight")?,
            port: arg_int(args, 2, "SRV port")?,
            target: qualify_target(arg_str(args, 3)?, origin)?,
        };
        Ok(())
    }

    fn audit(&self, rc: &RecordConfig) -> Vec<AuditIssue> {
        let mut issues = Vec::new();
        let mut labels = rc.name.split('.');
        let service = labels.next().unwrap_or_default();
        let proto = labels.next().unwrap_or_default();
        if !service.starts_with('_') || !proto.starts_with('_') {
            issues.push(AuditIssue::warning(
                rc,
                "SRV label should look like _service._proto",
            ));
        }
        if let RecordData::Srv { port: 0, target, .. } = &rc.data {
            if target != "." {
                issues.push(AuditIssue::warning(rc, "SRV port 0 with a real target"));
            }
        }
        issues
    }

    fn capability(&self) -> Option<Capability> {
        Some(Capability::CanUseSrv)
    }
}
