// # Cloudflare DNS Provider
//
// DNS service provider backed by the Cloudflare API v4.
//
// ## Behavior
//
// - Record-level corrections: one API call per created, changed or deleted record
// - Proxying is planned as the `cloudflare_proxy` metadata key (`on`/`off`)
// - Apex NS records belong to Cloudflare and are neither read nor written
// - Zone IDs come from a single cached zone listing per provider instance
// - Dynamic redirect rules are managed as `CF_SINGLE_REDIRECT` records when
//   the provider's `manage_redirects` setting is on
//
// ## Credentials
//
// ```json
// { "cloudflare": { "TYPE": "CLOUDFLAREAPI", "apitoken": "$CF_API_TOKEN", "accountid": "..." } }
// ```
//
// `accountid` is only needed to create zones.
//
// ## Security
//
// - API token NEVER appears in logs or `Debug` output
// - Provider construction fails fast if the token is missing or empty

mod api;
mod convert;
mod redirect;

pub use api::{CLOUDFLARE_API_BASE, CloudflareApi, DnsRecord, RedirectRule, Zone};
pub use convert::PROXY_META;
pub use redirect::REDIRECT_TYPE;

use async_trait::async_trait;
use dnsctl_core::config::ProviderCredentials;
use dnsctl_core::diff::{self, Change, DiffOptions, Verb};
use dnsctl_core::error::{Error, Result};
use dnsctl_core::models::{Correction, DomainConfig, Nameserver, RecordConfig};
use dnsctl_core::providers::{Capability, DnsServiceProvider, Features, ProviderRegistry, Support};
use dnsctl_core::rtype::{self, RTypeRegistry};
use dnsctl_core::ZoneCache;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Provider type name as registered
pub const PROVIDER_TYPE: &str = "CLOUDFLAREAPI";

/// Provider settings from the `dns_providers` declaration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudflareSettings {
    /// Manage the zone's dynamic redirect rules as `CF_SINGLE_REDIRECT` records
    #[serde(default)]
    pub manage_redirects: bool,

    /// API endpoint override
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Capabilities of the Cloudflare provider
pub fn features() -> Features {
    Features::new()
        .can(&[
            Capability::CanConcur,
            Capability::CanCreateZones,
            Capability::CanGetZones,
            Capability::CanUseCaa,
            Capability::CanUseDs,
            Capability::CanUseHttps,
            Capability::CanUsePtr,
            Capability::CanUseSrv,
            Capability::CanUseSvcb,
            Capability::CanUseTlsa,
        ])
        .with(Capability::CanAutoDnssec, Support::Unimplemented)
        .with(Capability::CanUseAlias, Support::Cannot)
}

/// Register the `CLOUDFLAREAPI` provider type
///
/// Credentials: `apitoken` (required), `accountid` (optional).
pub fn register(registry: &mut ProviderRegistry) -> Result<()> {
    registry.register_dns_provider(
        PROVIDER_TYPE,
        |creds: &ProviderCredentials, meta: &Value| -> Result<Arc<dyn DnsServiceProvider>> {
            Ok(Arc::new(CloudflareProvider::from_credentials(creds, meta)?))
        },
        features(),
    )
}

/// Register the record types only this provider understands
pub fn register_rtypes(registry: &mut RTypeRegistry) -> Result<()> {
    redirect::register(registry)
}

/// Cloudflare DNS provider
pub struct CloudflareProvider {
    api: CloudflareApi,
    settings: CloudflareSettings,
    zones: ZoneCache<Zone>,
}

impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api", &self.api)
            .field("settings", &self.settings)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a provider talking to the public API
    pub fn new(api_token: impl Into<String>, account_id: Option<String>) -> Result<Self> {
        Self::with_base_url(api_token, account_id, CLOUDFLARE_API_BASE)
    }

    /// Create a provider talking to `base_url`
    pub fn with_base_url(
        api_token: impl Into<String>,
        account_id: Option<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let api = CloudflareApi::new(api_token, account_id, base_url)?;
        Ok(Self::from_api(api, CloudflareSettings::default()))
    }

    /// Build from a credentials entry and the declaration's settings
    pub fn from_credentials(creds: &ProviderCredentials, meta: &Value) -> Result<Self> {
        let token = creds.require("apitoken")?;
        let account = creds.get("accountid").map(str::to_string);
        let settings: CloudflareSettings = if meta.is_null() {
            CloudflareSettings::default()
        } else {
            serde_json::from_value(meta.clone())
                .map_err(|e| Error::config(format!("invalid Cloudflare settings: {e}")))?
        };
        let base_url = settings.base_url.as_deref().unwrap_or(CLOUDFLARE_API_BASE);
        let api = CloudflareApi::new(token, account, base_url)?;
        Ok(Self::from_api(api, settings))
    }

    fn from_api(api: CloudflareApi, settings: CloudflareSettings) -> Self {
        let lister = api.clone();
        let zones = ZoneCache::new(move || {
            let api = lister.clone();
            async move {
                let zones = api.list_zones().await?;
                Ok(zones.into_iter().map(|z| (z.name.clone(), z)).collect())
            }
        });
        Self { api, settings, zones }
    }

    /// Builder-style switch for redirect management
    pub fn managing_redirects(mut self, manage: bool) -> Self {
        self.settings.manage_redirects = manage;
        self
    }

    fn redirect_corrections(
        &self,
        desired: &DomainConfig,
        zone_id: &str,
        existing: Vec<RecordConfig>,
    ) -> Result<(Vec<Correction>, usize)> {
        let wanted: Vec<RecordConfig> = desired
            .records
            .iter()
            .filter(|rc| rc.rtype == REDIRECT_TYPE)
            .map(|rc| rc.clone().with_ttl(redirect::REDIRECT_TTL))
            .collect();

        if !self.settings.manage_redirects {
            if wanted.is_empty() {
                return Ok((Vec::new(), 0));
            }
            return Err(Error::config(format!(
                "{}: {REDIRECT_TYPE} records need manage_redirects in the provider settings",
                desired.name
            )));
        }

        let rules = wanted
            .iter()
            .map(redirect::rule_from_record)
            .collect::<Result<Vec<_>>>()?;
        let mut scoped = DomainConfig::new(&desired.name);
        scoped.records = wanted;
        scoped.keep_unknown = desired.keep_unknown;
        let changes = diff::by_record_set(&scoped, &existing, &DiffOptions::new(rtype::global()));

        let api = self.api.clone();
        let zone_id = zone_id.to_string();
        Ok(diff::into_corrections(changes, move |_change| {
            let api = api.clone();
            let zone_id = zone_id.clone();
            let rules = rules.clone();
            async move { api.put_redirect_rules(&zone_id, &rules).await }
        }))
    }
}

fn record_id(rc: &RecordConfig) -> Result<&str> {
    rc.original
        .as_ref()
        .and_then(|h| h.downcast_ref::<DnsRecord>())
        .map(|native| native.id.as_str())
        .ok_or_else(|| {
            Error::provider(
                PROVIDER_TYPE,
                format!("{} {} was not read from Cloudflare", rc.rtype, rc.name_fqdn),
            )
        })
}

async fn apply_change(api: &CloudflareApi, zone_id: &str, change: Change) -> Result<()> {
    match change.verb {
        Verb::Create => {
            for rc in &change.new {
                api.create_record(zone_id, &convert::to_native(rc)?).await?;
            }
        }
        Verb::Delete => {
            for rc in &change.old {
                api.delete_record(zone_id, record_id(rc)?).await?;
            }
        }
        Verb::Change => {
            for (old, new) in change.old.iter().zip(&change.new) {
                api.update_record(zone_id, record_id(old)?, &convert::to_native(new)?)
                    .await?;
            }
        }
        Verb::Report => {}
    }
    tracing::debug!("Applied {} on {}", change.verb, change.key.name_fqdn);
    Ok(())
}

fn is_apex_ns(rc: &RecordConfig) -> bool {
    rc.rtype == "NS" && rc.is_apex()
}

#[async_trait]
impl DnsServiceProvider for CloudflareProvider {
    async fn get_nameservers(&self, domain: &str) -> Result<Vec<Nameserver>> {
        match self.zones.get_zone(domain).await {
            Ok(zone) => Ok(zone.name_servers.iter().map(Nameserver::new).collect()),
            // Not created yet: nothing to delegate to.
            Err(Error::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn get_zone_records(
        &self,
        domain: &str,
        _meta: &BTreeMap<String, String>,
    ) -> Result<Vec<RecordConfig>> {
        let zone = self.zones.get_zone(domain).await?;
        let natives = self.api.list_records(&zone.id).await?;
        tracing::debug!("Fetched {} records for {}", natives.len(), domain);

        let mut records = Vec::with_capacity(natives.len());
        for native in natives {
            if let Some(rc) = convert::to_record_config(native, domain)? {
                if !is_apex_ns(&rc) {
                    records.push(rc);
                }
            }
        }

        if self.settings.manage_redirects {
            let rules = self.api.get_redirect_rules(&zone.id).await?;
            records.extend(rules.iter().map(|rule| redirect::record_from_rule(rule, domain)));
        }
        Ok(records)
    }

    async fn get_zone_records_corrections(
        &self,
        desired: &DomainConfig,
        existing: Vec<RecordConfig>,
    ) -> Result<(Vec<Correction>, usize)> {
        let zone = self.zones.get_zone(&desired.name).await?;

        let mut dns = desired.clone();
        dns.records.retain(|rc| rc.rtype != REDIRECT_TYPE && !is_apex_ns(rc));
        for rc in &mut dns.records {
            convert::normalize_proxy(rc)?;
        }
        let (redirects, existing): (Vec<_>, Vec<_>) =
            existing.into_iter().partition(|rc| rc.rtype == REDIRECT_TYPE);

        let opts = DiffOptions::for_features(rtype::global(), &features()).with_material_meta(PROXY_META, "off");
        let changes = diff::by_record(&dns, &existing, &opts);
        let api = self.api.clone();
        let zone_id = zone.id.clone();
        let (mut corrections, mut count) = diff::into_corrections(changes, move |change| {
            let api = api.clone();
            let zone_id = zone_id.clone();
            async move { apply_change(&api, &zone_id, change).await }
        });

        let (more, n) = self.redirect_corrections(desired, &zone.id, redirects)?;
        corrections.extend(more);
        count += n;
        Ok((corrections, count))
    }

    async fn ensure_zone_exists(&self, domain: &str, _meta: &BTreeMap<String, String>) -> Result<()> {
        if self.zones.has_zone(domain).await? {
            return Ok(());
        }
        let zone = self.api.create_zone(domain).await?;
        tracing::info!("Created Cloudflare zone {} ({})", domain, zone.id);
        self.zones.set_zone(domain, zone).await;
        Ok(())
    }

    async fn list_zones(&self) -> Result<Vec<String>> {
        self.zones.get_zone_names().await
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_TYPE
    }
}
