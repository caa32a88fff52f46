// # DNS Service Provider Trait
//
// Interface for services that host zones.
//
// ## Implementations
//
// - Cloudflare: `dnsctl-provider-cloudflare` crate
// - BIND zone files: `dnsctl-provider-bind` crate
//
// ## Usage
//
// ```rust,ignore
// let existing = provider.get_zone_records("example.com", &dc.metadata).await?;
// let (corrections, changes) = provider
//     .get_zone_records_corrections(&dc, existing)
//     .await?;
// for correction in corrections {
//     println!("{}", correction.msg);
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::ProviderCredentials;
use crate::error::{Error, Result};
use crate::models::{Correction, DomainConfig, Nameserver, RecordConfig};

/// Trait for DNS service provider implementations
///
/// Planning must be free of side effects: every write happens inside the
/// returned corrections' thunks.
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait DnsServiceProvider: Send + Sync {
    /// Nameservers this provider would delegate `domain` to
    async fn get_nameservers(&self, domain: &str) -> Result<Vec<Nameserver>>;

    /// Current authoritative records of `domain`
    ///
    /// Records carry their provider-native value in `original` so that
    /// correction thunks can address them.
    async fn get_zone_records(
        &self,
        domain: &str,
        meta: &BTreeMap<String, String>,
    ) -> Result<Vec<RecordConfig>>;

    /// Plan the corrections that bring `existing` to `desired`.
    ///
    /// Returns the corrections and the number of actual changes they carry.
    async fn get_zone_records_corrections(
        &self,
        desired: &DomainConfig,
        existing: Vec<RecordConfig>,
    ) -> Result<(Vec<Correction>, usize)>;

    /// Create the zone if it does not exist. Must be idempotent.
    async fn ensure_zone_exists(&self, domain: &str, _meta: &BTreeMap<String, String>) -> Result<()> {
        Err(Error::provider(
            self.provider_name(),
            format!("cannot create zone {domain}"),
        ))
    }

    /// Names of the zones this account holds
    async fn list_zones(&self) -> Result<Vec<String>> {
        Err(Error::provider(self.provider_name(), "zone listing is not supported"))
    }

    /// Provider type name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS service providers from credentials
pub trait DnsServiceProviderFactory: Send + Sync {
    /// Create a provider instance
    ///
    /// # Parameters
    ///
    /// - `creds`: credentials of this instance; missing keys fail with
    ///   [`Error::MissingCredential`]
    /// - `meta`: provider settings from the document
    fn create(
        &self,
        creds: &ProviderCredentials,
        meta: &serde_json::Value,
    ) -> Result<Arc<dyn DnsServiceProvider>>;
}

impl<F> DnsServiceProviderFactory for F
where
    F: Fn(&ProviderCredentials, &serde_json::Value) -> Result<Arc<dyn DnsServiceProvider>>
        + Send
        + Sync,
{
    fn create(
        &self,
        creds: &ProviderCredentials,
        meta: &serde_json::Value,
    ) -> Result<Arc<dyn DnsServiceProvider>> {
        self(creds, meta)
    }
}
