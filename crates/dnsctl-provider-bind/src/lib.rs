// # BIND Zone-File Provider
//
// DNS service provider that keeps each zone as an RFC-1035 file in a
// directory, ready to be served by BIND, NSD or Knot.
//
// ## Behavior
//
// - Whole-zone corrections: one correction rewrites the entire file
// - Files are named `<zone>.zone` and written atomically (temp file, then
//   rename); the previous file is kept as `<zone>.backup`
// - The SOA serial is bumped on every write in `YYYYMMDDnn` form
// - A missing file is an empty zone
//
// ## Settings
//
// ```json
// { "name": "bind", "type": "BIND", "meta": {
//     "directory": "zones",
//     "nameservers": ["ns1.example.net", "ns2.example.net"],
//     "soa": { "mname": "ns1.example.net.", "rname": "hostmaster.example.net." }
// } }
// ```
//
// The credentials entry may carry `directory` too; it wins over the setting.

pub mod zonefile;

use async_trait::async_trait;
use dnsctl_core::config::ProviderCredentials;
use dnsctl_core::diff::{self, DiffOptions};
use dnsctl_core::error::{Error, Result};
use dnsctl_core::models::{Correction, DomainConfig, Nameserver, RecordConfig};
use dnsctl_core::providers::{Capability, DnsServiceProvider, Features, ProviderRegistry};
use dnsctl_core::rtype;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use zonefile::{Soa, ZoneFile};

/// Provider type name as registered
pub const PROVIDER_TYPE: &str = "BIND";

const ZONE_EXTENSION: &str = "zone";

/// Provider settings from the `dns_providers` declaration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BindSettings {
    /// Directory holding the zone files
    #[serde(default)]
    pub directory: Option<String>,

    /// Nameservers to delegate to
    #[serde(default)]
    pub nameservers: Vec<String>,

    /// SOA template for new and rewritten zones
    #[serde(default)]
    pub soa: Soa,
}

/// Capabilities of the zone-file provider
pub fn features() -> Features {
    Features::new().can(&[
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
}

/// Register the `BIND` provider type
pub fn register(registry: &mut ProviderRegistry) -> Result<()> {
    registry.register_dns_provider(
        PROVIDER_TYPE,
        |creds: &ProviderCredentials, meta: &Value| -> Result<Arc<dyn DnsServiceProvider>> {
            Ok(Arc::new(BindProvider::from_credentials(creds, meta)?))
        },
        features(),
    )
}

/// Zone-file DNS provider
#[derive(Debug, Clone)]
pub struct BindProvider {
    directory: PathBuf,
    nameservers: Vec<Nameserver>,
    soa: Soa,
}

impl BindProvider {
    /// Provider writing zone files into `directory`
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            nameservers: Vec::new(),
            soa: Soa::default(),
        }
    }

    /// Builder-style nameserver list
    pub fn with_nameservers<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.nameservers = names.iter().map(Nameserver::new).collect();
        self
    }

    /// Builder-style SOA template
    pub fn with_soa(mut self, soa: Soa) -> Self {
        self.soa = soa;
        self
    }

    /// Build from a credentials entry and the declaration's settings
    pub fn from_credentials(creds: &ProviderCredentials, meta: &Value) -> Result<Self> {
        let settings: BindSettings = if meta.is_null() {
            BindSettings::default()
        } else {
            serde_json::from_value(meta.clone())
                .map_err(|e| Error::config(format!("invalid BIND settings: {e}")))?
        };
        let directory = creds
            .get("directory")
            .or(settings.directory.as_deref())
            .unwrap_or("zones");
        Ok(Self::new(directory)
            .with_nameservers(&settings.nameservers)
            .with_soa(settings.soa))
    }

    /// Path of the zone file for `domain`
    pub fn zone_path(&self, domain: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{ZONE_EXTENSION}", domain.trim_end_matches('.').to_ascii_lowercase()))
    }

    async fn read_zone(path: &Path, domain: &str) -> Result<Option<ZoneFile>> {
        match fs::read_to_string(path).await {
            Ok(text) => zonefile::parse(&text, domain, rtype::global())
                .map(Some)
                .map_err(|e| Error::provider(PROVIDER_TYPE, format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_zone(path: PathBuf, domain: String, template: Soa, records: Vec<RecordConfig>) -> Result<()> {
        let previous = Self::read_zone(&path, &domain).await?.and_then(|z| z.soa);
        let mut soa = previous.unwrap_or_else(|| Soa::for_zone(&template, &domain));
        soa.serial = zonefile::next_serial(soa.serial, chrono::Utc::now().date_naive());
        let text = zonefile::render(&domain, &soa, &records);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut temp_path = path.clone();
        temp_path.set_extension("tmp");
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::provider(
                    PROVIDER_TYPE,
                    format!("Failed to create temp file {}: {}", temp_path.display(), e),
                )
            })?;
            out.write_all(text.as_bytes()).await?;
            out.flush().await?;
        }

        if path.exists() {
            let mut backup = path.clone();
            backup.set_extension("backup");
            if let Err(e) = fs::copy(&path, &backup).await {
                tracing::warn!("Failed to back up {}: {}", path.display(), e);
            }
        }

        fs::rename(&temp_path, &path).await.map_err(|e| {
            Error::provider(
                PROVIDER_TYPE,
                format!("Failed to rename {} to {}: {}", temp_path.display(), path.display(), e),
            )
        })?;
        tracing::info!("Wrote {} ({} records, serial {})", path.display(), records.len(), soa.serial);
        Ok(())
    }
}

#[async_trait]
impl DnsServiceProvider for BindProvider {
    async fn get_nameservers(&self, _domain: &str) -> Result<Vec<Nameserver>> {
        Ok(self.nameservers.clone())
    }

    async fn get_zone_records(
        &self,
        domain: &str,
        _meta: &BTreeMap<String, String>,
    ) -> Result<Vec<RecordConfig>> {
        let path = self.zone_path(domain);
        match Self::read_zone(&path, domain).await? {
            Some(zone) => {
                tracing::debug!("Read {} records from {}", zone.records.len(), path.display());
                Ok(zone.records)
            }
            None => {
                tracing::debug!("{} does not exist yet", path.display());
                Ok(Vec::new())
            }
        }
    }

    async fn get_zone_records_corrections(
        &self,
        desired: &DomainConfig,
        existing: Vec<RecordConfig>,
    ) -> Result<(Vec<Correction>, usize)> {
        let opts = DiffOptions::for_features(rtype::global(), &features());
        let Some(change) = diff::by_zone(desired, &existing, &opts) else {
            return Ok((Vec::new(), 0));
        };

        let path = self.zone_path(&desired.name);
        let mut msgs = change.msgs;
        msgs.push(format!("Write zone file {}", path.display()));
        let domain = desired.name.clone();
        let soa = self.soa.clone();
        let records = change.records;
        let correction = Correction::new(msgs.join("\n"), move || {
            Self::write_zone(path, domain, soa, records)
        });
        Ok((vec![correction], change.count))
    }

    async fn ensure_zone_exists(&self, domain: &str, _meta: &BTreeMap<String, String>) -> Result<()> {
        let path = self.zone_path(domain);
        if fs::try_exists(&path).await? {
            return Ok(());
        }
        Self::write_zone(path, domain.to_string(), self.soa.clone(), Vec::new()).await
    }

    async fn list_zones(&self) -> Result<Vec<String>> {
        let mut zones = Vec::new();
        let mut dir = match fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(zones),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ZONE_EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    zones.push(stem.to_string());
                }
            }
        }
        zones.sort();
        Ok(zones)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_TYPE
    }
}
