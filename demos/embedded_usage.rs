//! Minimal embedding example for dnsctl-core
//!
//! This example drives the reconciliation engine as a library: it registers
//! an in-process provider type, builds the desired state from a JSON
//! document, previews, pushes, and previews again to show convergence.

use dnsctl_core::diff::{self, Change, DiffOptions, Verb};
use dnsctl_core::models::{Correction, DomainConfig, Nameserver, RecordConfig};
use dnsctl_core::providers::{Capability, DnsServiceProvider, Features};
use dnsctl_core::{
    DnsDocument, Engine, EngineConfig, EngineEvent, Mode, ProviderCredentials, ProviderRegistry, Result,
    RunReport, rtype,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

type Zones = Arc<Mutex<HashMap<String, Vec<RecordConfig>>>>;

/// DNS provider keeping its zones in process memory
#[derive(Clone, Default)]
struct EmbeddedProvider {
    zones: Zones,
}

fn same_record(a: &RecordConfig, b: &RecordConfig) -> bool {
    a.rtype == b.rtype && a.name_fqdn == b.name_fqdn && a.data == b.data
}

async fn apply(zones: Zones, domain: String, change: Change) -> Result<()> {
    let mut zones = zones.lock().await;
    let records = zones.entry(domain).or_default();
    if matches!(change.verb, Verb::Delete | Verb::Change) {
        records.retain(|rc| !change.old.iter().any(|old| same_record(rc, old)));
    }
    if matches!(change.verb, Verb::Create | Verb::Change) {
        records.extend(change.new.iter().cloned().map(|mut rc| {
            rc.original = None;
            rc
        }));
    }
    println!("[Embedded] {}", change.msg());
    Ok(())
}

#[async_trait::async_trait]
impl DnsServiceProvider for EmbeddedProvider {
    async fn get_nameservers(&self, _domain: &str) -> Result<Vec<Nameserver>> {
        Ok(vec![Nameserver::new("ns1.embedded.test."), Nameserver::new("ns2.embedded.test.")])
    }

    async fn get_zone_records(
        &self,
        domain: &str,
        _meta: &BTreeMap<String, String>,
    ) -> Result<Vec<RecordConfig>> {
        Ok(self.zones.lock().await.get(domain).cloned().unwrap_or_default())
    }

    async fn get_zone_records_corrections(
        &self,
        desired: &DomainConfig,
        existing: Vec<RecordConfig>,
    ) -> Result<(Vec<Correction>, usize)> {
        let changes = diff::by_record(desired, &existing, &DiffOptions::new(rtype::global()));
        let zones = Arc::clone(&self.zones);
        let domain = desired.name.clone();
        Ok(diff::into_corrections(changes, move |change| {
            apply(Arc::clone(&zones), domain.clone(), change)
        }))
    }

    fn provider_name(&self) -> &'static str {
        "EMBEDDED"
    }
}

const DOCUMENT: &str = r#"{
    "registrars": [{"name": "none", "type": "NONE"}],
    "dns_providers": [{"name": "memory", "type": "EMBEDDED"}],
    "domains": [{
        "name": "example.com",
        "registrar": "none",
        "dnsProviders": {"memory": -1},
        "records": [
            {"type": "A", "args": ["@", "192.0.2.1"], "ttl": 300},
            {"type": "CNAME", "args": ["www", "@"]},
            {"type": "MX", "args": ["@", 10, "mx.example.net."]},
            {"type": "TXT", "args": ["@", "v=spf1 -all"]}
        ]
    }]
}"#;

fn print_report(title: &str, report: &RunReport) {
    println!("--- {} ({} changes, exit code {})", title, report.total_changes(), report.exit_code());
    for domain in &report.domains {
        for provider in &domain.providers {
            for msg in &provider.corrections {
                println!("  {}/{}: {}", domain.domain, provider.name, msg);
            }
        }
        for err in &domain.errors {
            println!("  {}: ERROR {}", domain.domain, err);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::WARN).init();

    println!("=== Embedded dnsctl-core Example ===\n");

    let provider = EmbeddedProvider::default();
    let mut registry = ProviderRegistry::with_builtins();
    let shared = provider.clone();
    registry.register_dns_provider(
        "EMBEDDED",
        move |_: &ProviderCredentials, _: &serde_json::Value| -> Result<Arc<dyn DnsServiceProvider>> {
            Ok(Arc::new(shared.clone()))
        },
        Features::new().can(&[Capability::CanConcur]),
    )?;

    let doc = DnsDocument::from_json(DOCUMENT)?;
    let config = EngineConfig {
        event_channel_capacity: 100,
        ..EngineConfig::default()
    };
    let (engine, events) = Engine::from_document(&doc, &HashMap::new(), &registry, config)?;

    let watcher = tokio::spawn(async move {
        let mut events = ReceiverStream::new(events);
        let mut applied = 0;
        while let Some(event) = events.next().await {
            if let EngineEvent::CorrectionSucceeded { .. } = event {
                applied += 1;
            }
        }
        applied
    });

    print_report("preview", &engine.run(doc.domain_configs(), Mode::Preview).await);
    print_report("push", &engine.run(doc.domain_configs(), Mode::Push).await);
    print_report("preview after push", &engine.run(doc.domain_configs(), Mode::Preview).await);

    drop(engine);
    let applied = watcher.await.unwrap_or_default();
    let stored = provider.get_zone_records("example.com", &BTreeMap::new()).await?;
    println!("\n{} corrections applied, {} records stored", applied, stored.len());
    Ok(())
}
