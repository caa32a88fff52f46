use std::collections::BTreeMap;

use super::{ArgKind, RTypeHandler, RTypeRegistry, arg_list};
use crate::audit::AuditIssue;
use crate::config::RawArg;
use crate::error::Result;
use crate::models::{RecordConfig, RecordData};
use crate::normalize::TXT_CHUNK_MAX;

pub(super) fn register(registry: &mut RTypeRegistry) -> Result<()> {
    registry.register(Txt)
}

struct Txt;

impl RTypeHandler for Txt {
    fn name(&self) -> &str {
        "TXT"
    }

    fn signature(&self) -> &[ArgKind] {
        &[ArgKind::StrOrList]
    }

    fn from_raw(
        &self,
        rc: &mut RecordConfig,
        _origin: &str,
        args: &[RawArg],
        _meta: &BTreeMap<String, String>,
    ) -> Result<()> {
        rc.set_txt_chunks(arg_list(args, 0)?);
        Ok(())
    }

    fn audit(&self, rc: &RecordConfig) -> Vec<AuditIssue> {
        let RecordData::Txt(chunks) = &rc.data else {
            return vec![AuditIssue::error(rc, "TXT record without TXT data")];
        };
        let mut issues = Vec::new();
        if chunks.iter().all(String::is_empty) {
            issues.push(AuditIssue::warning(rc, "TXT record is empty"));
        }
        if let Some(long) = chunks.iter().find(|c| c.len() > TXT_CHUNK_MAX) {
            issues.push(AuditIssue::error(
                rc,
                format!("TXT chunk of {} octets exceeds {}", long.len(), TXT_CHUNK_MAX),
            ));
        }
        issues
    }
}
