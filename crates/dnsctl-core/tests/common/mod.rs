//! Test doubles and common utilities for contract tests
//!
//! The doubles plan with the real diff planner and keep their "remote" state
//! in memory, so a push followed by a preview exercises the whole pipeline.

#![allow(dead_code)]

use async_trait::async_trait;
use dnsctl_core::diff::{self, Change, DiffOptions};
use dnsctl_core::error::{Error, Result};
use dnsctl_core::models::{Correction, DomainConfig, Nameserver, RecordConfig, RecordData};
use dnsctl_core::providers::{
    Capability, DnsProviderInstance, DnsServiceProvider, Features, Registrar, RegistrarInstance, Support,
    nameserver_correction,
};
use dnsctl_core::rtype;
use dnsctl_core::spf::SpfResolver;
use dnsctl_core::{Engine, EngineConfig, EngineEvent};
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Shared log of applied corrections, in completion order
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// An in-memory DNS provider that tracks calls
///
/// Clones share state and counters.
#[derive(Clone)]
pub struct MemoryProvider {
    zones: Arc<Mutex<HashMap<String, Vec<RecordConfig>>>>,
    nameservers: Vec<Nameserver>,
    features: Features,
    /// Call counter for get_zone_records()
    get_records_calls: Arc<AtomicUsize>,
    /// Call counter for get_nameservers()
    nameserver_calls: Arc<AtomicUsize>,
    /// Corrections applied successfully
    applied: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    /// Corrections whose message contains this fail
    fail_on: Option<String>,
    fail_listing: bool,
    fatal: bool,
    delay: Option<Duration>,
    journal: Option<Journal>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            zones: Arc::new(Mutex::new(HashMap::new())),
            nameservers: Vec::new(),
            features: record_features(),
            get_records_calls: Arc::new(AtomicUsize::new(0)),
            nameserver_calls: Arc::new(AtomicUsize::new(0)),
            applied: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            fail_on: None,
            fail_listing: false,
            fatal: false,
            delay: None,
            journal: None,
        }
    }

    pub fn with_nameservers(mut self, names: &[&str]) -> Self {
        self.nameservers = names.iter().map(|n| Nameserver::from(*n)).collect();
        self
    }

    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    /// Fail every correction whose message contains `needle`
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    /// Fail get_zone_records()
    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Mark every correction fatal
    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Seed the remote state of `zone`
    pub fn seed(&self, zone: &str, records: Vec<RecordConfig>) {
        self.zones.lock().unwrap().insert(zone.to_string(), records);
    }

    /// Current remote state of `zone`
    pub fn records(&self, zone: &str) -> Vec<RecordConfig> {
        self.zones.lock().unwrap().get(zone).cloned().unwrap_or_default()
    }

    pub fn get_records_calls(&self) -> usize {
        self.get_records_calls.load(Ordering::SeqCst)
    }

    pub fn nameserver_calls(&self) -> usize {
        self.nameserver_calls.load(Ordering::SeqCst)
    }

    pub fn applied(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Wrap a clone as a named engine instance
    pub fn instance(&self, name: &str) -> DnsProviderInstance {
        DnsProviderInstance {
            name: name.to_string(),
            provider_type: "MEMORY".to_string(),
            features: self.features.clone(),
            provider: Arc::new(self.clone()),
        }
    }

    async fn apply(&self, zone: &str, change: Change) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.apply_now(zone, &change);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn apply_now(&self, zone: &str, change: &Change) -> Result<()> {
        let msg = change.msg();
        if self.fail_on.as_deref().is_some_and(|needle| msg.contains(needle)) {
            return Err(Error::provider("memory", "injected failure"));
        }
        let registry = rtype::global();
        let mut zones = self.zones.lock().unwrap();
        let records = zones.entry(zone.to_string()).or_default();
        for old in &change.old {
            let found = records.iter().position(|rc| {
                rc.key() == old.key()
                    && rc.ttl == old.ttl
                    && registry.comparable(rc) == registry.comparable(old)
            });
            if let Some(pos) = found {
                records.remove(pos);
            }
        }
        records.extend(change.new.iter().cloned());
        drop(zones);

        self.applied.fetch_add(1, Ordering::SeqCst);
        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(format!("dns {msg}"));
        }
        Ok(())
    }
}

#[async_trait]
impl DnsServiceProvider for MemoryProvider {
    async fn get_nameservers(&self, _domain: &str) -> Result<Vec<Nameserver>> {
        self.nameserver_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.nameservers.clone())
    }

    async fn get_zone_records(
        &self,
        domain: &str,
        _meta: &BTreeMap<String, String>,
    ) -> Result<Vec<RecordConfig>> {
        self.get_records_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing {
            return Err(Error::provider("memory", "listing failed"));
        }
        Ok(self.records(domain))
    }

    async fn get_zone_records_corrections(
        &self,
        desired: &DomainConfig,
        existing: Vec<RecordConfig>,
    ) -> Result<(Vec<Correction>, usize)> {
        let opts = DiffOptions::for_features(rtype::global(), &self.features);
        let changes = diff::by_record(desired, &existing, &opts);
        let provider = self.clone();
        let zone = desired.name.clone();
        let (corrections, count) = diff::into_corrections(changes, move |change| {
            let provider = provider.clone();
            let zone = zone.clone();
            async move { provider.apply(&zone, change).await }
        });
        let corrections = if self.fatal {
            corrections.into_iter().map(Correction::fatal).collect()
        } else {
            corrections
        };
        Ok((corrections, count))
    }

    fn provider_name(&self) -> &'static str {
        "MEMORY"
    }
}

/// A registrar double holding the observed delegation
#[derive(Clone)]
pub struct MockRegistrar {
    delegation: Arc<Mutex<Vec<Nameserver>>>,
    update_calls: Arc<AtomicUsize>,
    journal: Option<Journal>,
}

impl MockRegistrar {
    pub fn new(current: &[&str]) -> Self {
        Self {
            delegation: Arc::new(Mutex::new(current.iter().map(|n| Nameserver::from(*n)).collect())),
            update_calls: Arc::new(AtomicUsize::new(0)),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn delegation(&self) -> Vec<String> {
        self.delegation.lock().unwrap().iter().map(|ns| ns.name.clone()).collect()
    }

    pub fn instance(&self, name: &str) -> RegistrarInstance {
        RegistrarInstance {
            name: name.to_string(),
            provider_type: "MOCKREG".to_string(),
            features: Features::new(),
            registrar: Arc::new(self.clone()),
        }
    }
}

#[async_trait]
impl Registrar for MockRegistrar {
    async fn get_registrar_corrections(&self, dc: &DomainConfig) -> Result<Vec<Correction>> {
        let observed = self.delegation.lock().unwrap().clone();
        let desired = dc.nameservers.clone();
        let this = self.clone();
        let correction = nameserver_correction(&dc.name, &observed, &dc.nameservers, move || async move {
            this.update_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(journal) = &this.journal {
                journal.lock().unwrap().push("registrar".to_string());
            }
            *this.delegation.lock().unwrap() = desired;
            Ok(())
        });
        Ok(correction.into_iter().collect())
    }

    fn registrar_name(&self) -> &'static str {
        "MOCKREG"
    }
}

/// An SPF resolver answering from a fixed table
pub struct StaticResolver {
    answers: HashMap<String, Vec<String>>,
    calls: Arc<AtomicUsize>,
}

impl StaticResolver {
    pub fn new(answers: &[(&str, &str)]) -> Self {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (label, text) in answers {
            map.entry(label.to_string()).or_default().push(text.to_string());
        }
        Self {
            answers: map,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpfResolver for StaticResolver {
    async fn get_txt(&self, label: &str) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answers.get(label).cloned().unwrap_or_default())
    }
}

/// Capabilities covering every built-in record type
pub fn record_features() -> Features {
    Features::new().can(&[
        Capability::CanUseAlias,
        Capability::CanUseCaa,
        Capability::CanUseDs,
        Capability::CanUseHttps,
        Capability::CanUsePtr,
        Capability::CanUseSrv,
        Capability::CanUseSvcb,
        Capability::CanUseTlsa,
    ])
}

/// Record capabilities plus concurrent corrections
pub fn concurrent_features() -> Features {
    record_features().with(Capability::CanConcur, Support::Can)
}

/// Engine over `providers` with default settings
pub fn engine_with(
    providers: Vec<DnsProviderInstance>,
    registrars: Vec<RegistrarInstance>,
) -> (Engine, mpsc::Receiver<EngineEvent>) {
    Engine::new(EngineConfig::default(), providers, registrars).expect("engine construction succeeds")
}

/// Drain every event emitted so far
pub fn drain(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn a(label: &str, ip: [u8; 4], ttl: u32) -> RecordConfig {
    RecordConfig::new("A", label, "example.com", RecordData::A(Ipv4Addr::from(ip))).with_ttl(ttl)
}

/// `example.com` served by provider `p1`, using none of its nameservers
pub fn domain(records: Vec<RecordConfig>) -> DomainConfig {
    let mut dc = DomainConfig::new("example.com")
        .with_dsp("p1", dnsctl_core::NameserverCount::None);
    dc.records = records;
    dc
}
