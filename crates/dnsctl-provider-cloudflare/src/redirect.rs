// # CF_SINGLE_REDIRECT
//
// Vendor record type for a Cloudflare dynamic redirect rule:
//
// ```text
// CF_SINGLE_REDIRECT("@", name, code, when, then)
// ```
//
// `when` is a filter expression and `then` a target URL expression. The
// records live at the apex and map one-to-one onto the rules of the zone's
// `http_request_dynamic_redirect` ruleset, which is always written whole.

use dnsctl_core::audit::AuditIssue;
use dnsctl_core::config::RawArg;
use dnsctl_core::error::{Error, Result};
use dnsctl_core::models::{RecordConfig, RecordData};
use dnsctl_core::rtype::{ArgKind, RTypeHandler, RTypeRegistry};
use std::collections::BTreeMap;

use crate::PROVIDER_TYPE;
use crate::api::{RedirectParameters, RedirectRule, RedirectTarget, TargetUrl};

/// Record type name
pub const REDIRECT_TYPE: &str = "CF_SINGLE_REDIRECT";

/// TTL redirect records are compared at; rules have none of their own
pub(crate) const REDIRECT_TTL: u32 = 1;

const STATUS_CODES: &[u16] = &[301, 302, 303, 307, 308];

/// Register the redirect record type
pub fn register(registry: &mut RTypeRegistry) -> Result<()> {
    registry.register(SingleRedirect)
}

struct SingleRedirect;

struct Parts<'a> {
    name: &'a str,
    code: &'a str,
    when: &'a str,
    then: &'a str,
}

fn parts(rc: &RecordConfig) -> Option<Parts<'_>> {
    match &rc.data {
        RecordData::Fields(f) if f.len() == 4 => Some(Parts {
            name: &f[0],
            code: &f[1],
            when: &f[2],
            then: &f[3],
        }),
        _ => None,
    }
}

impl RTypeHandler for SingleRedirect {
    fn name(&self) -> &str {
        REDIRECT_TYPE
    }

    fn signature(&self) -> &[ArgKind] {
        &[ArgKind::Str, ArgKind::Int, ArgKind::Str, ArgKind::Str]
    }

    fn from_raw(
        &self,
        rc: &mut RecordConfig,
        _origin: &str,
        args: &[RawArg],
        _meta: &BTreeMap<String, String>,
    ) -> Result<()> {
        let fields = args
            .iter()
            .map(|arg| match arg {
                RawArg::Str(s) => Ok(s.trim().to_string()),
                RawArg::Int(n) => Ok(n.to_string()),
                other => Err(Error::validation(format!(
                    "{REDIRECT_TYPE} arguments must be strings or integers, got {other:?}"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        rc.data = RecordData::Fields(fields);
        Ok(())
    }

    fn audit(&self, rc: &RecordConfig) -> Vec<AuditIssue> {
        let Some(p) = parts(rc) else {
            return vec![AuditIssue::error(rc, "redirect needs name, code, when and then")];
        };
        let mut issues = Vec::new();
        if !rc.is_apex() {
            issues.push(AuditIssue::error(rc, "redirects must be declared at the apex (@)"));
        }
        match p.code.parse::<u16>() {
            Ok(code) if STATUS_CODES.contains(&code) => {}
            _ => issues.push(AuditIssue::error(rc, format!("invalid redirect code {}", p.code))),
        }
        if p.when.is_empty() || p.then.is_empty() {
            issues.push(AuditIssue::error(rc, "redirect expressions cannot be empty"));
        }
        issues
    }

    fn comparable(&self, rc: &RecordConfig) -> String {
        match parts(rc) {
            Some(p) => format!("name={:?} code={} when=({}) then=({})", p.name, p.code, p.when, p.then),
            None => rc.data.to_string(),
        }
    }

    fn display(&self, rc: &RecordConfig) -> String {
        match parts(rc) {
            Some(p) => format!("{:?} {} {} -> {}", p.name, p.code, p.when, p.then),
            None => rc.data.to_string(),
        }
    }

    fn provider_only(&self) -> Option<&str> {
        Some(PROVIDER_TYPE)
    }
}

/// Lift a ruleset rule into a redirect record within `origin`.
pub fn record_from_rule(rule: &RedirectRule, origin: &str) -> RecordConfig {
    let target = &rule.action_parameters.from_value.target_url;
    let then = target
        .expression
        .clone()
        .or_else(|| target.value.as_ref().map(|v| format!("{v:?}")))
        .unwrap_or_default();
    let fields = vec![
        rule.description.clone(),
        rule.action_parameters.from_value.status_code.to_string(),
        rule.expression.clone(),
        then,
    ];
    RecordConfig::new(REDIRECT_TYPE, "@", origin, RecordData::Fields(fields)).with_ttl(REDIRECT_TTL)
}

/// Lower a redirect record into a ruleset rule.
pub fn rule_from_record(rc: &RecordConfig) -> Result<RedirectRule> {
    let p = parts(rc).ok_or_else(|| {
        Error::validation(format!("{} is not a well-formed {REDIRECT_TYPE}", rc.name_fqdn))
    })?;
    let status_code = p
        .code
        .parse()
        .map_err(|_| Error::validation(format!("invalid redirect code {}", p.code)))?;
    Ok(RedirectRule {
        id: None,
        description: p.name.to_string(),
        expression: p.when.to_string(),
        action: "redirect".to_string(),
        action_parameters: RedirectParameters {
            from_value: RedirectTarget {
                status_code,
                target_url: TargetUrl {
                    expression: Some(p.then.to_string()),
                    value: None,
                },
                preserve_query_string: false,
            },
        },
        enabled: true,
    })
}
