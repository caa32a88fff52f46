//! Reconciliation driver
//!
//! The [`Engine`] takes each domain's desired state through the pipeline and
//! hands the resulting corrections to the providers:
//!
//! ```text
//!  DomainConfig (raw)
//!        │ lower, transform, default TTL, SPF
//!        ▼
//!  DomainConfig (typed) ── audit ──▶ errors fail the zone
//!        │ nameservers, apex NS records
//!        ▼
//! ┌──────────────┐   ┌──────────────┐        ┌─────────────┐
//! │ DNS provider │   │ DNS provider │  ...   │  Registrar  │
//! │  plan/apply  │   │  plan/apply  │        │ (after DNS) │
//! └──────────────┘   └──────────────┘        └─────────────┘
//!        │                  │                       │
//!        └──────────── EngineEvent ─────────────────┘
//! ```
//!
//! ## Execution
//!
//! 1. Within one provider's zone, corrections start in planned order; up to
//!    `concurrency` run at once when the provider declares `CanConcur`,
//!    otherwise one at a time
//! 2. Providers of the same domain execute concurrently
//! 3. A failed correction is recorded and its peers still run, unless it is
//!    fatal, in which case the rest of that zone is skipped
//! 4. The registrar correction runs only once every DNS correction of the
//!    domain succeeded
//! 5. Cancellation is checked at every correction boundary; a running
//!    correction is never interrupted

pub mod nameservers;
pub mod report;

use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use crate::audit::{self, AuditIssue};
use crate::config::{DnsDocument, EngineConfig, ProviderCredentials};
use crate::error::{Error, Result};
use crate::lower::lower_domain;
use crate::models::{Correction, DomainConfig};
use crate::providers::{Capability, DnsProviderInstance, ProviderRegistry, RegistrarInstance};
use crate::rtype::{self, RTypeRegistry};
use crate::spf::{self, SpfResolver};
use crate::transform::apply_transforms;

pub use nameservers::{add_ns_records, determine_nameservers};
pub use report::{DomainReport, Mode, ProviderReport, RunReport};

/// Events emitted by the [`Engine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A domain entered the pipeline
    DomainStarted {
        domain: String,
    },

    /// A provider planned a correction
    CorrectionPlanned {
        domain: String,
        provider: String,
        msg: String,
    },

    /// A correction is about to run
    CorrectionStarted {
        domain: String,
        provider: String,
        msg: String,
    },

    /// A correction ran successfully
    CorrectionSucceeded {
        domain: String,
        provider: String,
        msg: String,
    },

    /// A correction failed
    CorrectionFailed {
        domain: String,
        provider: String,
        msg: String,
        error: String,
    },

    /// A domain left the pipeline
    DomainFinished {
        domain: String,
        changes: usize,
        errors: usize,
    },
}

/// Requests cancellation of a running [`Engine`]
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Stop at the next correction boundary.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Core reconciliation engine
///
/// ## Lifecycle
///
/// 1. Create with [`Engine::new()`] or [`Engine::from_document()`]
/// 2. Optionally attach an SPF resolver with [`Engine::with_spf_resolver()`]
/// 3. Call [`Engine::run()`] with the domains to reconcile
/// 4. Read the returned [`RunReport`] and the event receiver
pub struct Engine {
    config: EngineConfig,
    dns_providers: HashMap<String, DnsProviderInstance>,
    registrars: HashMap<String, RegistrarInstance>,
    rtypes: &'static RTypeRegistry,
    spf_resolver: Option<Arc<dyn SpfResolver>>,
    event_tx: mpsc::Sender<EngineEvent>,
    cancel_tx: Arc<watch::Sender<bool>>,
}

struct Planned<'e> {
    report: ProviderReport,
    instance: Option<&'e DnsProviderInstance>,
    corrections: Vec<Correction>,
}

#[derive(Default)]
struct Execution {
    applied: usize,
    errors: Vec<String>,
}

impl Engine {
    /// Create an engine over constructed provider instances
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        config: EngineConfig,
        dns_providers: Vec<DnsProviderInstance>,
        registrars: Vec<RegistrarInstance>,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let mut providers = HashMap::new();
        for instance in dns_providers {
            let name = instance.name.clone();
            if providers.insert(name.clone(), instance).is_some() {
                return Err(Error::config(format!("DNS provider {name} declared twice")));
            }
        }
        let mut regs = HashMap::new();
        for instance in registrars {
            let name = instance.name.clone();
            if regs.insert(name.clone(), instance).is_some() {
                return Err(Error::config(format!("Registrar {name} declared twice")));
            }
        }

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);
        let (cancel_tx, _) = watch::channel(false);

        let engine = Self {
            config,
            dns_providers: providers,
            registrars: regs,
            rtypes: rtype::global(),
            spf_resolver: None,
            event_tx: tx,
            cancel_tx: Arc::new(cancel_tx),
        };
        Ok((engine, rx))
    }

    /// Construct every provider the document declares and create an engine.
    ///
    /// Instances without an entry in `creds` get empty credentials; providers
    /// that need keys fail with [`Error::MissingCredential`].
    pub fn from_document(
        doc: &DnsDocument,
        creds: &HashMap<String, ProviderCredentials>,
        registry: &ProviderRegistry,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        let creds_for = |name: &str| {
            creds
                .get(name)
                .cloned()
                .unwrap_or_else(|| ProviderCredentials::new(name, BTreeMap::new()))
        };
        let dns_providers = doc
            .dns_providers
            .iter()
            .map(|decl| registry.create_dns_provider(decl, &creds_for(&decl.name)))
            .collect::<Result<Vec<_>>>()?;
        let registrars = doc
            .registrars
            .iter()
            .map(|decl| registry.create_registrar(decl, &creds_for(&decl.name)))
            .collect::<Result<Vec<_>>>()?;
        Self::new(config, dns_providers, registrars)
    }

    /// Resolve SPF includes through `resolver` when flattening.
    pub fn with_spf_resolver(mut self, resolver: Arc<dyn SpfResolver>) -> Self {
        self.spf_resolver = Some(resolver);
        self
    }

    /// Use `rtypes` instead of the process-wide record-type registry.
    pub fn with_rtypes(mut self, rtypes: &'static RTypeRegistry) -> Self {
        self.rtypes = rtypes;
        self
    }

    /// Handle that cancels this engine's runs
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Reconcile `domains` in order.
    pub async fn run(&self, domains: Vec<DomainConfig>, mode: Mode) -> RunReport {
        let mut report = RunReport {
            mode,
            domains: Vec::new(),
        };
        for dc in domains {
            if !self.config.wants_domain(&dc.name) {
                debug!("Domain {} filtered out, skipping", dc.name);
                continue;
            }
            if self.is_cancelled() {
                warn!("Run cancelled before {}", dc.name);
                let mut skipped = DomainReport::new(&dc.name);
                skipped.errors.push(Error::Cancelled.to_string());
                report.domains.push(skipped);
                continue;
            }
            report.domains.push(self.reconcile_domain(dc, mode).await);
        }
        info!(
            "Run finished: {} domains, {} changes, {} errors",
            report.domains.len(),
            report.total_changes(),
            report.total_errors()
        );
        report
    }

    /// Take a domain from its document form to audited, typed records.
    ///
    /// Lowers raw tuples, applies IP transforms and the default TTL, flattens
    /// SPF and runs the provider-independent audit. Returns every finding;
    /// the caller decides whether they block.
    pub async fn prepare(&self, dc: &mut DomainConfig) -> Result<Vec<AuditIssue>> {
        if !dc.raw_records.is_empty() {
            lower_domain(dc, self.rtypes)?;
        }
        apply_transforms(dc)?;
        dc.apply_default_ttl();

        let mut issues = Vec::new();
        match &self.spf_resolver {
            Some(resolver) => issues.extend(spf::process_domain(dc, &**resolver).await?),
            None => {
                for rc in dc.records.iter().filter(|rc| {
                    rc.meta(spf::FLATTEN_META).is_some() || rc.meta(spf::SPLIT_META).is_some()
                }) {
                    issues.push(AuditIssue::warning(
                        rc,
                        "SPF metadata ignored: no SPF resolver configured",
                    ));
                }
            }
        }
        issues.extend(audit::audit_domain(dc, self.rtypes));
        Ok(issues)
    }

    async fn reconcile_domain(&self, mut dc: DomainConfig, mode: Mode) -> DomainReport {
        let domain = dc.name.clone();
        let mut report = DomainReport::new(&domain);
        self.emit_event(EngineEvent::DomainStarted {
            domain: domain.clone(),
        });

        match self.prepare(&mut dc).await {
            Ok(issues) => {
                report.audit = issues;
                if let Err(e) = audit::enforce(&domain, &report.audit) {
                    report.errors.push(e.to_string());
                    return self.finish(report);
                }
            }
            Err(e) => {
                error!("{}: {}", domain, e);
                report.errors.push(e.to_string());
                return self.finish(report);
            }
        }

        let unknown: Vec<String> = dc
            .dsps
            .iter()
            .filter(|dsp| !self.dns_providers.contains_key(&dsp.name))
            .map(|dsp| dsp.name.clone())
            .collect();
        if !unknown.is_empty() {
            if self.config.strict_providers {
                for name in unknown {
                    report.errors.push(Error::UnknownProvider(name).to_string());
                }
                return self.finish(report);
            }
            warn!("{}: skipping undeclared providers {:?}", domain, unknown);
            dc.dsps.retain(|dsp| !unknown.contains(&dsp.name));
        }

        match determine_nameservers(&dc, &self.dns_providers).await {
            Ok(nameservers) => dc.nameservers = nameservers,
            Err(e) => {
                error!("{}: failed to determine nameservers: {}", domain, e);
                report.errors.push(e.to_string());
                return self.finish(report);
            }
        }
        add_ns_records(&mut dc);
        debug!(
            "{}: {} records, nameservers {:?}",
            domain,
            dc.records.len(),
            dc.nameservers.iter().map(|ns| ns.name.as_str()).collect::<Vec<_>>()
        );

        let mut planned = Vec::new();
        for dsp in &dc.dsps {
            if !self.config.wants_provider(&dsp.name) {
                debug!("Provider {} filtered out, skipping", dsp.name);
                continue;
            }
            let Some(instance) = self.dns_providers.get(&dsp.name) else {
                continue;
            };
            let mut provider_report = ProviderReport::new(&dsp.name);
            match self.plan_provider(&dc, instance, mode, &mut report.audit).await {
                Ok((corrections, changes)) => {
                    for c in &corrections {
                        info!("{} [{}] {}", domain, dsp.name, c.msg);
                        self.emit_event(EngineEvent::CorrectionPlanned {
                            domain: domain.clone(),
                            provider: dsp.name.clone(),
                            msg: c.msg.clone(),
                        });
                    }
                    provider_report.corrections = corrections.iter().map(|c| c.msg.clone()).collect();
                    provider_report.changes = changes;
                    planned.push(Planned {
                        report: provider_report,
                        instance: Some(instance),
                        corrections,
                    });
                }
                Err(e) => {
                    error!("{} [{}] planning failed: {}", domain, dsp.name, e);
                    provider_report.errors.push(e.to_string());
                    planned.push(Planned {
                        report: provider_report,
                        instance: None,
                        corrections: Vec::new(),
                    });
                }
            }
        }

        let mut registrar_plan = None;
        if !dc.registrar_name.is_empty() {
            let mut registrar_report = ProviderReport::new(&dc.registrar_name);
            match self.registrars.get(&dc.registrar_name) {
                Some(instance) => match instance.registrar.get_registrar_corrections(&dc).await {
                    Ok(corrections) => {
                        for c in &corrections {
                            info!("{} [{}] {}", domain, dc.registrar_name, c.msg);
                            self.emit_event(EngineEvent::CorrectionPlanned {
                                domain: domain.clone(),
                                provider: dc.registrar_name.clone(),
                                msg: c.msg.clone(),
                            });
                        }
                        registrar_report.corrections = corrections.iter().map(|c| c.msg.clone()).collect();
                        registrar_report.changes = corrections.iter().filter(|c| c.has_action()).count();
                        registrar_plan = Some(corrections);
                    }
                    Err(e) => {
                        error!("{} [{}] planning failed: {}", domain, dc.registrar_name, e);
                        registrar_report.errors.push(e.to_string());
                    }
                },
                None => registrar_report
                    .errors
                    .push(Error::UnknownProvider(dc.registrar_name.clone()).to_string()),
            }
            report.registrar = Some(registrar_report);
        }

        if mode == Mode::Push {
            let jobs = planned.iter_mut().map(|p| {
                let concurrent = p
                    .instance
                    .is_some_and(|i| i.features.has(Capability::CanConcur));
                let corrections = std::mem::take(&mut p.corrections);
                self.execute(&domain, &p.report.name, concurrent, corrections)
            });
            let outcomes = futures::future::join_all(jobs).await;
            for (p, outcome) in planned.iter_mut().zip(outcomes) {
                p.report.applied = outcome.applied;
                p.report.errors.extend(outcome.errors);
            }

            let dns_clean = planned.iter().all(|p| p.report.errors.is_empty());
            if let (Some(corrections), Some(registrar_report)) = (registrar_plan, report.registrar.as_mut()) {
                if dns_clean {
                    let outcome = self
                        .execute(&domain, &registrar_report.name, false, corrections)
                        .await;
                    registrar_report.applied = outcome.applied;
                    registrar_report.errors.extend(outcome.errors);
                } else if !corrections.is_empty() {
                    warn!("{}: DNS corrections failed, registrar update skipped", domain);
                    registrar_report
                        .errors
                        .push("skipped: DNS corrections of this domain failed".to_string());
                }
            }
        }

        report.providers = planned.into_iter().map(|p| p.report).collect();
        self.finish(report)
    }

    async fn plan_provider(
        &self,
        dc: &DomainConfig,
        instance: &DnsProviderInstance,
        mode: Mode,
        findings: &mut Vec<AuditIssue>,
    ) -> Result<(Vec<Correction>, usize)> {
        let issues = audit::audit_capabilities(
            &dc.records,
            &instance.name,
            &instance.provider_type,
            &instance.features,
            self.rtypes,
        );
        let verdict = audit::enforce(&format!("{} [{}]", dc.name, instance.name), &issues);
        findings.extend(issues);
        verdict?;

        if mode == Mode::Push && self.config.populate && instance.features.has(Capability::CanCreateZones) {
            instance
                .provider
                .ensure_zone_exists(&dc.name, &dc.metadata)
                .await?;
        }

        let existing = instance
            .provider
            .get_zone_records(&dc.name, &dc.metadata)
            .await?;
        debug!("{} [{}]: {} existing records", dc.name, instance.name, existing.len());
        instance
            .provider
            .get_zone_records_corrections(dc, existing)
            .await
    }

    async fn execute(
        &self,
        domain: &str,
        provider: &str,
        concurrent: bool,
        corrections: Vec<Correction>,
    ) -> Execution {
        if corrections.is_empty() {
            return Execution::default();
        }
        let limit = if concurrent { self.config.concurrency } else { 1 };
        let halted = AtomicBool::new(false);

        let results: Vec<Option<std::result::Result<(), String>>> = stream::iter(corrections)
            .map(|correction| {
                let halted = &halted;
                async move {
                    if halted.load(Ordering::SeqCst) || self.is_cancelled() {
                        return None;
                    }
                    let msg = correction.msg.clone();
                    let fatal = correction.is_fatal();
                    self.emit_event(EngineEvent::CorrectionStarted {
                        domain: domain.to_string(),
                        provider: provider.to_string(),
                        msg: msg.clone(),
                    });
                    match correction.run().await {
                        Ok(()) => {
                            self.emit_event(EngineEvent::CorrectionSucceeded {
                                domain: domain.to_string(),
                                provider: provider.to_string(),
                                msg,
                            });
                            Some(Ok(()))
                        }
                        Err(e) => {
                            error!("{} [{}] {} failed: {}", domain, provider, msg, e);
                            if fatal {
                                halted.store(true, Ordering::SeqCst);
                            }
                            self.emit_event(EngineEvent::CorrectionFailed {
                                domain: domain.to_string(),
                                provider: provider.to_string(),
                                msg: msg.clone(),
                                error: e.to_string(),
                            });
                            Some(Err(format!("{msg}: {e}")))
                        }
                    }
                }
            })
            .buffered(limit)
            .collect()
            .await;

        let mut outcome = Execution::default();
        let mut skipped = 0;
        for result in results {
            match result {
                Some(Ok(())) => outcome.applied += 1,
                Some(Err(e)) => outcome.errors.push(e),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            let reason = if self.is_cancelled() {
                Error::Cancelled.to_string()
            } else {
                "halted after a fatal failure".to_string()
            };
            outcome.errors.push(format!("{skipped} corrections not applied: {reason}"));
        }
        outcome
    }

    fn finish(&self, report: DomainReport) -> DomainReport {
        let changes = report.changes();
        let errors = report.error_count();
        if errors > 0 {
            warn!("{}: finished with {} errors", report.domain, errors);
        } else {
            info!("{}: {} changes", report.domain, changes);
        }
        self.emit_event(EngineEvent::DomainFinished {
            domain: report.domain.clone(),
            changes,
            errors,
        });
        report
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        // Bounded channel: drop rather than block the pipeline.
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("Event receiver dropped, discarding event");
            }
        }
    }
}
