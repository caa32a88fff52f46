use std::collections::BTreeMap;

use super::{ArgKind, RTypeHandler, RTypeRegistry, arg_int, arg_str};
use crate::audit::AuditIssue;
use crate::config::RawArg;
use crate::error::{Error, Result};
use crate::models::{RecordConfig, RecordData};
use crate::providers::Capability;

const KNOWN_TAGS: &[&str] = &["issue", "issuewild", "iodef", "issuemail", "issuevmc"];

pub(super) fn register(registry: &mut RTypeRegistry) -> Result<()> {
    registry.register(Caa)
}

struct Caa;

impl RTypeHandler for Caa {
    fn name(&self) -> &str {
        "CAA"
    }

    fn signature(&self) -> &[ArgKind] {
        &[ArgKind::Int, ArgKind::Str, ArgKind::Str]
    }

    fn from_raw(
        &self,
        rc: &mut RecordConfig,
        _origin: &str,
        args: &[RawArg],
        _meta: &BTreeMap<String, String>,
    ) -> Result<()> {
        let tag = arg_str(args, 1)?.trim().to_ascii_lowercase();
        if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::validation(format!("invalid CAA tag {tag:?}")));
        }
        rc.data = RecordData::Caa {
            flag: arg_int(args, 0, "CAA flag")?,
            tag,
            value: arg_str(args, 2)?.to_string(),
        };
        Ok(())
    }

    fn audit(&self, rc: &RecordConfig) -> Vec<AuditIssue> {
        let RecordData::Caa { flag, tag, .. } = &rc.data else {
            return vec![AuditIssue::error(rc, "CAA record without CAA data")];
        };
        let mut issues = Vec::new();
        if !KNOWN_TAGS.contains(&tag.as_str()) {
            issues.push(AuditIssue::warning(rc, format!("unknown CAA tag {tag}")));
        }
        if *flag != 0 && *flag != 128 {
            issues.push(AuditIssue::warning(rc, format!("unusual CAA flag {flag}")));
        }
        issues
    }

    fn capability(&self) -> Option<Capability> {
        Some(Capability::CanUseCaa)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caa(tag: &str) -> Result<RecordConfig> {
        let mut rc = RecordConfig::new("CAA", "@", "example.com", RecordData::Fields(vec![]));
        Caa.from_raw(
            &mut rc,
            "example.com",
            &[
                RawArg::Int(0),
                RawArg::Str(tag.into()),
                RawArg::Str("letsencrypt.org".into()),
            ],
            &BTreeMap::new(),
        )?;
        Ok(rc)
    }

    #[test]
    fn tag_is_lowercased() {
        let rc = caa("ISSUE").unwrap();
        assert_eq!(rc.data.to_string(), "0 issue \"letsencrypt.org\"");
        assert!(Caa.audit(&rc).is_empty());
    }

    #[test]
    fn odd_tags() {
        assert!(caa("bad tag").is_err());
        assert_eq!(Caa.audit(&caa("future").unwrap()).len(), 1);
    }
}
