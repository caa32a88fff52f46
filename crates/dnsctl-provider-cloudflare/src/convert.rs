// Conversion between Cloudflare's record shape and RecordConfig.
//
// Cloudflare returns owner names and targets without a trailing dot, and
// reports TXT content either bare or in quoted wire form. Proxying is kept
// as the `cloudflare_proxy` metadata key on A, AAAA and CNAME records.

use dnsctl_core::error::{Error, Result};
use dnsctl_core::models::{ProviderHandle, RecordConfig, RecordData};
use dnsctl_core::normalize::{ensure_trailing_dot, txt};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::PROVIDER_TYPE;
use crate::api::DnsRecord;

/// Metadata key holding a record's proxy setting (`on` or `off`)
pub const PROXY_META: &str = "cloudflare_proxy";

/// TTL Cloudflare reports for proxied records ("automatic")
pub const AUTO_TTL: u32 = 1;

const PROXIABLE: &[&str] = &["A", "AAAA", "CNAME"];

#[derive(Serialize, Deserialize)]
struct SrvData {
    priority: u16,
    weight: u16,
    port: u16,
    target: String,
}

#[derive(Serialize, Deserialize)]
struct CaaData {
    flags: u8,
    tag: String,
    value: String,
}

#[derive(Serialize, Deserialize)]
struct TlsaData {
    usage: u8,
    selector: u8,
    matching_type: u8,
    certificate: String,
}

#[derive(Serialize, Deserialize)]
struct DsData {
    key_tag: u16,
    algorithm: u8,
    digest_type: u8,
    digest: String,
}

#[derive(Serialize, Deserialize)]
struct SvcbData {
    priority: u16,
    target: String,
    #[serde(default)]
    value: String,
}

fn data_of<T: DeserializeOwned>(native: &DnsRecord) -> Result<T> {
    let data = native.data.clone().ok_or_else(|| {
        Error::provider(
            PROVIDER_TYPE,
            format!("{} record {} has no data", native.record_type, native.name),
        )
    })?;
    Ok(serde_json::from_value(data)?)
}

fn content_of(native: &DnsRecord) -> &str {
    native.content.as_deref().unwrap_or_default()
}

fn bad_content(native: &DnsRecord) -> Error {
    Error::provider(
        PROVIDER_TYPE,
        format!(
            "unparseable {} content {:?} for {}",
            native.record_type,
            content_of(native),
            native.name
        ),
    )
}

/// Whether `rtype` can be proxied
pub fn is_proxiable(rtype: &str) -> bool {
    PROXIABLE.contains(&rtype)
}

/// Lift an API record into a RecordConfig within `origin`.
///
/// Returns `None` for record types this provider does not manage.
pub fn to_record_config(native: DnsRecord, origin: &str) -> Result<Option<RecordConfig>> {
    let rtype = native.record_type.to_ascii_uppercase();
    let content = content_of(&native);
    let data = match rtype.as_str() {
        "A" => RecordData::A(content.parse().map_err(|_| bad_content(&native))?),
        "AAAA" => RecordData::Aaaa(content.parse().map_err(|_| bad_content(&native))?),
        "CNAME" | "NS" | "PTR" => RecordData::Target(ensure_trailing_dot(&content.to_ascii_lowercase())),
        "MX" => RecordData::Mx {
            preference: native.priority.unwrap_or_default(),
            target: ensure_trailing_dot(&content.to_ascii_lowercase()),
        },
        "TXT" => RecordData::Txt(txt::normalize_chunks(&txt::decode_wire(content)?)),
        "SRV" => {
            let d: SrvData = data_of(&native)?;
            RecordData::Srv {
                priority: d.priority,
                weight: d.weight,
                port: d.port,
                target: ensure_trailing_dot(&d.target.to_ascii_lowercase()),
            }
        }
        "CAA" => {
            let d: CaaData = data_of(&native)?;
            RecordData::Caa {
                flag: d.flags,
                tag: d.tag.to_ascii_lowercase(),
                value: d.value,
            }
        }
        "TLSA" => {
            let d: TlsaData = data_of(&native)?;
            RecordData::Tlsa {
                usage: d.usage,
                selector: d.selector,
                matching_type: d.matching_type,
                certificate: d.certificate.to_ascii_lowercase(),
            }
        }
        "DS" => {
            let d: DsData = data_of(&native)?;
            RecordData::Ds {
                key_tag: d.key_tag,
                algorithm: d.algorithm,
                digest_type: d.digest_type,
                digest: d.digest.to_ascii_lowercase(),
            }
        }
        "SVCB" | "HTTPS" => {
            let d: SvcbData = data_of(&native)?;
            RecordData::Svcb {
                priority: d.priority,
                target: ensure_trailing_dot(&d.target.to_ascii_lowercase()),
                params: d.value.split_whitespace().collect::<Vec<_>>().join(" "),
            }
        }
        other => {
            tracing::warn!("Ignoring unsupported {} record {}", other, native.name);
            return Ok(None);
        }
    };

    let mut rc = RecordConfig::from_fqdn(rtype.as_str(), &native.name, origin, data).with_ttl(native.ttl);
    if is_proxiable(&rtype) {
        let proxied = native.proxied.unwrap_or(false);
        rc = rc.with_meta(PROXY_META, if proxied { "on" } else { "off" });
    }
    Ok(Some(rc.with_original(ProviderHandle::new(PROVIDER_TYPE, native))))
}

/// Parse a record's proxy setting; `None` when unset.
pub fn proxy_setting(rc: &RecordConfig) -> Result<Option<bool>> {
    match rc.meta(PROXY_META).map(str::to_ascii_lowercase).as_deref() {
        None => Ok(None),
        Some("on" | "true") => Ok(Some(true)),
        Some("off" | "false") => Ok(Some(false)),
        Some(other) => Err(Error::validation(format!(
            "{} {}: {PROXY_META} must be on or off, got {other:?}",
            rc.rtype, rc.name_fqdn
        ))),
    }
}

/// Rewrite a desired record's proxy setting to its canonical `on`/`off` form.
///
/// Proxied records always carry [`AUTO_TTL`], matching what the API reports.
pub fn normalize_proxy(rc: &mut RecordConfig) -> Result<()> {
    match proxy_setting(rc)? {
        Some(true) if !is_proxiable(&rc.rtype) => Err(Error::validation(format!(
            "{} {}: only A, AAAA and CNAME records can be proxied",
            rc.rtype, rc.name_fqdn
        ))),
        Some(proxied) => {
            if proxied {
                rc.ttl = AUTO_TTL;
            }
            rc.metadata
                .insert(PROXY_META.to_string(), if proxied { "on" } else { "off" }.to_string());
            Ok(())
        }
        None => Ok(()),
    }
}

fn bare(target: &str) -> String {
    if target == "." {
        target.to_string()
    } else {
        target.trim_end_matches('.').to_string()
    }
}

/// Lower a RecordConfig into the API shape
pub fn to_native(rc: &RecordConfig) -> Result<DnsRecord> {
    let mut native = DnsRecord {
        id: String::new(),
        record_type: rc.rtype.clone(),
        name: rc.name_fqdn.clone(),
        content: None,
        ttl: rc.ttl,
        priority: None,
        proxied: None,
        data: None,
    };
    match &rc.data {
        RecordData::A(ip) => native.content = Some(ip.to_string()),
        RecordData::Aaaa(ip) => native.content = Some(ip.to_string()),
        RecordData::Target(target) => native.content = Some(bare(target)),
        RecordData::Mx { preference, target } => {
            native.priority = Some(*preference);
            native.content = Some(bare(target));
        }
        RecordData::Txt(chunks) => native.content = Some(txt::encode_wire(chunks)),
        RecordData::Srv {
            priority,
            weight,
            port,
            target,
        } => {
            native.data = Some(to_data(SrvData {
                priority: *priority,
                weight: *weight,
                port: *port,
                target: bare(target),
            })?);
        }
        RecordData::Caa { flag, tag, value } => {
            native.data = Some(to_data(CaaData {
                flags: *flag,
                tag: tag.clone(),
                value: value.clone(),
            })?);
        }
        RecordData::Tlsa {
            usage,
            selector,
            matching_type,
            certificate,
        } => {
            native.data = Some(to_data(TlsaData {
                usage: *usage,
                selector: *selector,
                matching_type: *matching_type,
                certificate: certificate.clone(),
            })?);
        }
        RecordData::Ds {
            key_tag,
            algorithm,
            digest_type,
            digest,
        } => {
            native.data = Some(to_data(DsData {
                key_tag: *key_tag,
                algorithm: *algorithm,
                digest_type: *digest_type,
                digest: digest.clone(),
            })?);
        }
        RecordData::Svcb {
            priority,
            target,
            params,
        } => {
            native.data = Some(to_data(SvcbData {
                priority: *priority,
                target: bare(target),
                value: params.clone(),
            })?);
        }
        RecordData::Fields(_) => {
            return Err(Error::provider(
                PROVIDER_TYPE,
                format!("{} is not a DNS record type", rc.rtype),
            ));
        }
    }
    if is_proxiable(&rc.rtype) {
        native.proxied = Some(proxy_setting(rc)?.unwrap_or(false));
    }
    Ok(native)
}

fn to_data<T: Serialize>(data: T) -> Result<Value> {
    Ok(serde_json::to_value(data)?)
}
