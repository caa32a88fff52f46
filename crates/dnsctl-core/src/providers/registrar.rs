// # Registrar Trait
//
// Registrars own the delegation of a domain: the nameserver list published
// in the parent zone.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::config::ProviderCredentials;
use crate::error::Result;
use crate::models::{Correction, DomainConfig, Nameserver};

/// Trait for registrar implementations
#[async_trait]
pub trait Registrar: Send + Sync {
    /// Compare the observed delegation with `dc.nameservers`.
    ///
    /// Returns at most one correction, which calls the registrar's update API.
    async fn get_registrar_corrections(&self, dc: &DomainConfig) -> Result<Vec<Correction>>;

    /// Registrar type name (for logging/debugging)
    fn registrar_name(&self) -> &'static str;
}

/// Helper trait for constructing registrars from credentials
pub trait RegistrarFactory: Send + Sync {
    /// Create a registrar instance
    fn create(&self, creds: &ProviderCredentials, meta: &serde_json::Value) -> Result<Arc<dyn Registrar>>;
}

impl<F> RegistrarFactory for F
where
    F: Fn(&ProviderCredentials, &serde_json::Value) -> Result<Arc<dyn Registrar>> + Send + Sync,
{
    fn create(&self, creds: &ProviderCredentials, meta: &serde_json::Value) -> Result<Arc<dyn Registrar>> {
        self(creds, meta)
    }
}

/// Build the single delegation correction, or `None` if nothing differs.
///
/// Lists compare as case-insensitive sets.
pub fn nameserver_correction<F, Fut>(
    domain: &str,
    observed: &[Nameserver],
    desired: &[Nameserver],
    apply: F,
) -> Option<Correction>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let render = |list: &[Nameserver]| {
        let mut names: Vec<String> = list.iter().map(|ns| ns.name.to_ascii_lowercase()).collect();
        names.sort();
        names.dedup();
        names.join(",")
    };
    let (old, new) = (render(observed), render(desired));
    if old == new {
        return None;
    }
    Some(Correction::new(
        format!("Update nameservers for {domain}: {old} -> {new}"),
        apply,
    ))
}

/// Registrar that manages nothing; used for domains whose delegation is
/// handled out of band
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneRegistrar;

#[async_trait]
impl Registrar for NoneRegistrar {
    async fn get_registrar_corrections(&self, _dc: &DomainConfig) -> Result<Vec<Correction>> {
        Ok(Vec::new())
    }

    fn registrar_name(&self) -> &'static str {
        "NONE"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(names: &[&str]) -> Vec<Nameserver> {
        names.iter().map(|n| Nameserver::from(*n)).collect()
    }

    #[test]
    fn same_set_needs_no_correction() {
        let correction = nameserver_correction(
            "example.com",
            &ns(&["B.ns.net", "a.ns.net"]),
            &ns(&["a.ns.net.", "b.ns.net"]),
            || async { Ok(()) },
        );
        assert!(correction.is_none());
    }

    #[test]
    fn changed_set_yields_one_correction() {
        let correction = nameserver_correction(
            "example.com",
            &ns(&["old.ns.net"]),
            &ns(&["a.ns.net", "b.ns.net"]),
            || async { Ok(()) },
        )
        .unwrap();
        assert_eq!(
            correction.msg,
            "Update nameservers for example.com: old.ns.net -> a.ns.net,b.ns.net"
        );
    }

    #[tokio::test]
    async fn none_registrar_never_corrects() {
        let dc = DomainConfig::new("example.com");
        assert!(NoneRegistrar.get_registrar_corrections(&dc).await.unwrap().is_empty());
    }
}
