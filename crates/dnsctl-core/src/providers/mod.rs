//! Provider boundary
//!
//! This module defines the interfaces that DNS service providers and
//! registrars implement, their capability matrices, and the registry that
//! constructs them from document declarations.
//!
//! - [`DnsServiceProvider`]: read zone state and plan corrections
//! - [`Registrar`]: plan delegation updates
//! - [`Features`]: per-type capability matrix
//! - [`ProviderRegistry`]: type name → factory

pub mod capability;
pub mod dns_provider;
pub mod registrar;
pub mod registry;

pub use capability::{Capability, Features, Support};
pub use dns_provider::{DnsServiceProvider, DnsServiceProviderFactory};
pub use registrar::{NoneRegistrar, Registrar, RegistrarFactory, nameserver_correction};
pub use registry::{DnsProviderInstance, ProviderRegistry, RegistrarInstance};
