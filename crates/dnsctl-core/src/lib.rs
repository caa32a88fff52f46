// # dnsctl-core
//
// Core library of the declarative DNS configuration engine.
//
// ## Architecture Overview
//
// The desired state of each domain arrives as a JSON document of untyped
// record tuples. The pipeline lifts it into typed records, audits it, and
// reconciles it against what each provider reports:
//
// - **RTypeRegistry**: record-type handlers (parse, audit, canonical form)
// - **Lowering**: raw tuples → typed `RecordConfig`s
// - **Audit / SPF / Transform**: provider-independent rewriting and checks
// - **Diff planner**: desired vs existing → ordered `Correction`s
// - **DnsServiceProvider / Registrar**: the provider boundary
// - **Engine**: drives every domain through the pipeline
//
// ## Design Principles
//
// 1. **Library-First**: the CLI is a thin layer over this crate
// 2. **Plugin-Based**: providers and vendor record types register by name
// 3. **Pure Planning**: providers read during planning and write only in
//    correction thunks
// 4. **Idempotency**: applying a plan and planning again yields nothing

pub mod audit;
pub mod config;
pub mod diff;
pub mod domaintree;
pub mod engine;
pub mod error;
pub mod lower;
pub mod models;
pub mod normalize;
pub mod providers;
pub mod rtype;
pub mod spf;
pub mod transform;
pub mod zonecache;

// Re-export core types for convenience
pub use audit::{AuditIssue, Severity};
pub use config::{DnsDocument, DomainDocument, EngineConfig, ProviderCredentials, ProviderDecl, RawArg, RawRecord};
pub use diff::{Change, DiffOptions, Verb, ZoneChange};
pub use domaintree::DomainTree;
pub use engine::{CancelHandle, Engine, EngineEvent, Mode, RunReport};
pub use error::{Error, Result};
pub use models::{Correction, DomainConfig, Nameserver, NameserverCount, RecordConfig, RecordData};
pub use providers::{
    Capability, DnsServiceProvider, Features, ProviderRegistry, Registrar, Support,
};
pub use rtype::RTypeRegistry;
pub use zonecache::ZoneCache;
