//! Plugin-based provider registry
//!
//! Provider crates register their types by name, with a factory and a
//! capability matrix, avoiding hardcoded if-else chains in the driver.
//!
//! ## Registration
//!
//! ```rust,ignore
//! // In dnsctl-provider-cloudflare
//! pub fn register(registry: &mut ProviderRegistry) -> Result<()> {
//!     registry.register_dns_provider("CLOUDFLAREAPI", CloudflareFactory, features())
//! }
//! ```
//!
//! The registry is built once and handed to the engine; after that it is only
//! read, so it needs no locking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ProviderCredentials, ProviderDecl};
use crate::error::{Error, Result};
use crate::providers::capability::Features;
use crate::providers::dns_provider::{DnsServiceProvider, DnsServiceProviderFactory};
use crate::providers::registrar::{NoneRegistrar, Registrar, RegistrarFactory};

struct DnsEntry {
    factory: Box<dyn DnsServiceProviderFactory>,
    features: Features,
}

struct RegistrarEntry {
    factory: Box<dyn RegistrarFactory>,
    features: Features,
}

/// A constructed DNS service provider with its declaration
#[derive(Clone)]
pub struct DnsProviderInstance {
    /// Instance name from the document
    pub name: String,
    /// Registered type name
    pub provider_type: String,
    /// Capability matrix of the type
    pub features: Features,
    /// The provider
    pub provider: Arc<dyn DnsServiceProvider>,
}

impl std::fmt::Debug for DnsProviderInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsProviderInstance")
            .field("name", &self.name)
            .field("provider_type", &self.provider_type)
            .finish_non_exhaustive()
    }
}

/// A constructed registrar with its declaration
#[derive(Clone)]
pub struct RegistrarInstance {
    /// Instance name from the document
    pub name: String,
    /// Registered type name
    pub provider_type: String,
    /// Capability matrix of the type
    pub features: Features,
    /// The registrar
    pub registrar: Arc<dyn Registrar>,
}

/// Registry of DNS service provider and registrar types
#[derive(Default)]
pub struct ProviderRegistry {
    dns_providers: HashMap<String, DnsEntry>,
    registrars: HashMap<String, RegistrarEntry>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in `NONE` registrar
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.registrars.insert(
            "NONE".to_string(),
            RegistrarEntry {
                factory: Box::new(
                    |_: &ProviderCredentials, _: &serde_json::Value| -> Result<Arc<dyn Registrar>> {
                        Ok(Arc::new(NoneRegistrar))
                    },
                ),
                features: Features::new(),
            },
        );
        registry
    }

    /// Register a DNS service provider type
    ///
    /// Fails with [`Error::DuplicateProvider`] if the name is taken.
    pub fn register_dns_provider(
        &mut self,
        name: impl Into<String>,
        factory: impl DnsServiceProviderFactory + 'static,
        features: Features,
    ) -> Result<()> {
        let name = name.into().to_ascii_uppercase();
        if self.dns_providers.contains_key(&name) {
            return Err(Error::DuplicateProvider(name));
        }
        tracing::debug!("Registered DNS provider type {}", name);
        self.dns_providers.insert(
            name,
            DnsEntry {
                factory: Box::new(factory),
                features,
            },
        );
        Ok(())
    }

    /// Register a registrar type
    ///
    /// Fails with [`Error::DuplicateProvider`] if the name is taken.
    pub fn register_registrar(
        &mut self,
        name: impl Into<String>,
        factory: impl RegistrarFactory + 'static,
        features: Features,
    ) -> Result<()> {
        let name = name.into().to_ascii_uppercase();
        if self.registrars.contains_key(&name) {
            return Err(Error::DuplicateProvider(name));
        }
        tracing::debug!("Registered registrar type {}", name);
        self.registrars.insert(
            name,
            RegistrarEntry {
                factory: Box::new(factory),
                features,
            },
        );
        Ok(())
    }

    /// Capability matrix of a DNS provider type
    pub fn dns_provider_features(&self, provider_type: &str) -> Option<&Features> {
        self.dns_providers
            .get(&provider_type.to_ascii_uppercase())
            .map(|e| &e.features)
    }

    /// Registered DNS provider type names, sorted
    pub fn dns_provider_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.dns_providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered registrar type names, sorted
    pub fn registrar_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registrars.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct a DNS service provider for a document declaration
    pub fn create_dns_provider(
        &self,
        decl: &ProviderDecl,
        creds: &ProviderCredentials,
    ) -> Result<DnsProviderInstance> {
        let provider_type = resolve_type(decl, creds)?;
        let entry = self
            .dns_providers
            .get(&provider_type)
            .ok_or_else(|| Error::UnknownProvider(provider_type.clone()))?;
        let provider = entry.factory.create(creds, &decl.meta)?;
        tracing::info!("Created DNS provider {} ({})", decl.name, provider_type);
        Ok(DnsProviderInstance {
            name: decl.name.clone(),
            provider_type,
            features: entry.features.clone(),
            provider,
        })
    }

    /// Construct a registrar for a document declaration
    pub fn create_registrar(
        &self,
        decl: &ProviderDecl,
        creds: &ProviderCredentials,
    ) -> Result<RegistrarInstance> {
        let provider_type = resolve_type(decl, creds)?;
        let entry = self
            .registrars
            .get(&provider_type)
            .ok_or_else(|| Error::UnknownProvider(provider_type.clone()))?;
        let registrar = entry.factory.create(creds, &decl.meta)?;
        tracing::info!("Created registrar {} ({})", decl.name, provider_type);
        Ok(RegistrarInstance {
            name: decl.name.clone(),
            provider_type,
            features: entry.features.clone(),
            registrar,
        })
    }
}

// The document names the type; a `TYPE` key in the credentials must agree.
fn resolve_type(decl: &ProviderDecl, creds: &ProviderCredentials) -> Result<String> {
    let declared = decl.provider_type.to_ascii_uppercase();
    match creds.type_hint() {
        Some(hint) if !hint.eq_ignore_ascii_case(&declared) && !declared.is_empty() => {
            Err(Error::config(format!(
                "Provider {} is declared as {} but its credentials say {}",
                decl.name, declared, hint
            )))
        }
        Some(hint) if declared.is_empty() => Ok(hint.to_ascii_uppercase()),
        _ if declared.is_empty() => Err(Error::config(format!(
            "Provider {} has no type",
            decl.name
        ))),
        _ => Ok(declared),
    }
}
