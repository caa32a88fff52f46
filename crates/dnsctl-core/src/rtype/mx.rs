use std::collections::BTreeMap;

use super::{ArgKind, RTypeHandler, RTypeRegistry, arg_int, arg_str, qualify_target};
use crate::audit::AuditIssue;
use crate::config::RawArg;
use crate::error::Result;
use crate::models::{RecordConfig, RecordData};

pub(super) fn register(registry: &mut RTypeRegistry) -> Result<()> {
    registry.register(Mx)
}

struct Mx;

impl RTypeHandler for Mx {
    fn name(&self) -> &str {
        "MX"
    }

    fn signature(&self) -> &[ArgKind] {
        &[ArgKind::Int, ArgKind::Str]
    }

    fn from_raw(
        &self,
        rc: &mut RecordConfig,
        origin: &str,
        args: &[RawArg],
        _meta: &BTreeMap<String, String>,
    ) -> Result<()> {
        rc.data = RecordData::Mx {
            preference: arg_int(args, 0, "MX preference")?,
            target: qualify_target(arg_str(args, 1)?, origin)?,
        };
        Ok(())
    }

    fn audit(&self, rc: &RecordConfig) -> Vec<AuditIssue> {
        match &rc.data {
            // RFC 7505 null MX
            RecordData::Mx { preference, target } if target == "." && *preference != 0 => {
                vec![AuditIssue::warning(rc, "null MX should use preference 0")]
            }
            _ => Vec::new(),
        }
    }
}
