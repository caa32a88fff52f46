// # Nameserver accounting
//
// The delegation of a domain is its explicit nameservers followed by those
// of each DNS provider, capped by the provider's nameserver count.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::models::{DomainConfig, Nameserver, NameserverCount, RecordConfig, RecordData};
use crate::normalize::label;
use crate::providers::DnsProviderInstance;

/// Collect the nameservers `dc` must be delegated to.
///
/// Providers with a count of zero are never asked. Duplicates are dropped,
/// keeping the first occurrence.
pub async fn determine_nameservers(
    dc: &DomainConfig,
    providers: &HashMap<String, DnsProviderInstance>,
) -> Result<Vec<Nameserver>> {
    let mut out: Vec<Nameserver> = Vec::new();
    let mut push = |ns: Nameserver| {
        if !out.contains(&ns) {
            out.push(ns);
        }
    };
    for ns in &dc.nameservers {
        push(ns.clone());
    }

    for dsp in &dc.dsps {
        if dsp.nameserver_count == NameserverCount::None {
            continue;
        }
        let instance = providers
            .get(&dsp.name)
            .ok_or_else(|| Error::UnknownProvider(dsp.name.clone()))?;
        let available = instance.provider.get_nameservers(&dc.name).await?;
        let selected = dsp.nameserver_count.select(&available);
        tracing::debug!(
            "{}: using {} of {} nameservers from {}",
            dc.name,
            selected.len(),
            available.len(),
            dsp.name
        );
        for ns in selected {
            push(ns.clone());
        }
    }
    Ok(out)
}

/// Add an apex NS record for every nameserver not already published there.
pub fn add_ns_records(dc: &mut DomainConfig) {
    let ttl = dc.zone_ttl();
    let present: Vec<String> = dc
        .records
        .iter()
        .filter(|rc| rc.rtype == "NS" && rc.is_apex())
        .filter_map(|rc| rc.data.target_name())
        .map(|t| t.trim_end_matches('.').to_ascii_lowercase())
        .collect();

    let missing: Vec<RecordConfig> = dc
        .nameservers
        .iter()
        .filter(|ns| !present.contains(&ns.name.to_ascii_lowercase()))
        .map(|ns| {
            RecordConfig::new(
                "NS",
                label::APEX,
                &dc.name,
                RecordData::Target(label::ensure_trailing_dot(&ns.name)),
            )
            .with_ttl(ttl)
        })
        .collect();
    dc.records.extend(missing);
}
