//! Contract Test: Plugin Registry & Documents
//!
//! This test verifies that providers are constructed by name from the
//! desired-state document and credentials, without the driver knowing any
//! concrete provider type.
//!
//! Constraints verified:
//! - Documents drive provider construction through the registry
//! - Missing credentials fail construction with the provider's name
//! - Duplicate and unknown provider types are configuration errors
//! - Credentials files load from disk and expand nothing they should not
//!
//! If this test fails, the provider boundary is broken.

mod common;

use common::*;
use dnsctl_core::config::{DnsDocument, ProviderCredentials, load_credentials, parse_credentials};
use dnsctl_core::error::{Error, Result};
use dnsctl_core::providers::{DnsServiceProvider, Features, ProviderRegistry};
use dnsctl_core::{Engine, EngineConfig, Mode};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio_test::assert_ok;

const DOCUMENT: &str = r#"{
    "registrars": [{"name": "none", "type": "NONE"}],
    "dns_providers": [{"name": "mem", "type": "MEMORY"}],
    "domains": [{
        "name": "example.com",
        "registrar": "none",
        "dnsProviders": {"mem": 0},
        "records": [
            {"type": "A", "args": ["@", "198.51.100.7"], "ttl": 300},
            {"type": "MX", "args": ["@", 10, "mx.example.net."]},
            {"type": "TXT", "args": ["@", ["v=spf1", " -all"]], "meta": {"note": 1}}
        ]
    }]
}"#;

fn registry_with(provider: &MemoryProvider) -> ProviderRegistry {
    let mut registry = ProviderRegistry::with_builtins();
    let provider = provider.clone();
    registry
        .register_dns_provider(
            "memory",
            move |_creds: &ProviderCredentials, _meta: &serde_json::Value| -> Result<Arc<dyn DnsServiceProvider>> {
                Ok(Arc::new(provider.clone()))
            },
            record_features(),
        )
        .expect("first registration succeeds");
    registry
}

#[tokio::test]
async fn document_drives_provider_construction() {
    let provider = MemoryProvider::new();
    let registry = registry_with(&provider);
    let doc = assert_ok!(DnsDocument::from_json(DOCUMENT));

    let (engine, _rx) = assert_ok!(Engine::from_document(
        &doc,
        &HashMap::new(),
        &registry,
        EngineConfig::default()
    ));
    let report = engine.run(doc.domain_configs(), Mode::Push).await;
    assert!(!report.has_errors(), "{:?}", report.domains);
    assert_eq!(report.total_changes(), 3);

    let registrar = report.domains[0].registrar.as_ref().unwrap();
    assert!(registrar.corrections.is_empty());

    let stored = provider.records("example.com");
    let txt = stored.iter().find(|rc| rc.rtype == "TXT").unwrap();
    assert_eq!(txt.txt_joined().as_deref(), Some("v=spf1 -all"));
    assert_eq!(txt.meta("note"), Some("1"));
}

#[test]
fn undeclared_references_fail_validation() {
    let text = DOCUMENT.replace(r#""dnsProviders": {"mem": 0}"#, r#""dnsProviders": {"other": 0}"#);
    assert!(matches!(DnsDocument::from_json(&text), Err(Error::Config(_))));
}

#[test]
fn missing_credentials_name_the_provider() {
    let mut registry = ProviderRegistry::with_builtins();
    registry
        .register_dns_provider(
            "MEMORY",
            |creds: &ProviderCredentials, _meta: &serde_json::Value| -> Result<Arc<dyn DnsServiceProvider>> {
                creds.require("apikey")?;
                Ok(Arc::new(MemoryProvider::new()))
            },
            Features::new(),
        )
        .unwrap();
    let doc = DnsDocument::from_json(DOCUMENT).unwrap();

    let err = Engine::from_document(&doc, &HashMap::new(), &registry, EngineConfig::default())
        .err()
        .expect("construction must fail");
    match err {
        Error::MissingCredential { provider, key } => {
            assert_eq!(provider, "mem");
            assert_eq!(key, "apikey");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn duplicate_and_unknown_types_are_rejected() {
    let provider = MemoryProvider::new();
    let mut registry = registry_with(&provider);
    let again = registry.register_dns_provider(
        "MEMORY",
        |_: &ProviderCredentials, _: &serde_json::Value| -> Result<Arc<dyn DnsServiceProvider>> {
            Ok(Arc::new(MemoryProvider::new()))
        },
        Features::new(),
    );
    assert!(matches!(again, Err(Error::DuplicateProvider(name)) if name == "MEMORY"));

    let doc = DnsDocument::from_json(&DOCUMENT.replace(r#""type": "MEMORY""#, r#""type": "NOPE""#)).unwrap();
    let err = Engine::from_document(&doc, &HashMap::new(), &registry, EngineConfig::default()).err();
    assert!(matches!(err, Some(Error::UnknownProvider(name)) if name == "NOPE"));
}

#[test]
fn credential_type_hint_must_agree() {
    let provider = MemoryProvider::new();
    let registry = registry_with(&provider);
    let doc = DnsDocument::from_json(DOCUMENT).unwrap();
    let creds = parse_credentials(r#"{"mem": {"TYPE": "CLOUDFLAREAPI", "apitoken": "x"}}"#).unwrap();

    let err = Engine::from_document(&doc, &creds, &registry, EngineConfig::default()).err();
    assert!(matches!(err, Some(Error::Config(_))));
}

#[tokio::test]
async fn credentials_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"mem": {{"TYPE": "MEMORY", "apikey": "secret", "empty": ""}}}}"#).unwrap();

    let creds = assert_ok!(load_credentials(file.path()).await);
    let mem = &creds["mem"];
    assert_eq!(mem.get("apikey"), Some("secret"));
    assert_eq!(mem.type_hint(), Some("MEMORY"));
    assert!(mem.require("empty").is_err());
    assert!(!format!("{mem:?}").contains("secret"));
}

#[test]
fn unset_environment_reference_is_an_error() {
    let err = parse_credentials(r#"{"mem": {"apikey": "$DNSCTL_TEST_SURELY_UNSET_VARIABLE"}}"#);
    assert!(matches!(err, Err(Error::Config(_))));
}
