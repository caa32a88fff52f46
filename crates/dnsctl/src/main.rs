// # dnsctl - Declarative DNS CLI
//
// Thin front end over `dnsctl-core`. It owns process concerns only:
// argument parsing, logging setup, provider registration, reading the
// document and credentials files, and turning the run report into output
// and an exit code. Planning and execution live in the core.
//
// ## Commands
//
// - `preview`: plan every domain and print the corrections
// - `push`: plan, then execute the corrections
// - `check`: lower and audit the document without touching any provider
// - `print-ir`: print the lowered document as JSON
//
// ## Configuration
//
// - `--config` / `DNSCTL_CONFIG`: desired-state document (default `dnsconfig.json`)
// - `--creds` / `DNSCTL_CREDS`: credentials file (default `creds.json`)
// - `--log-level` / `DNSCTL_LOG_LEVEL`: trace, debug, info, warn, error
// - `--domains`, `--providers`: comma-separated filters
// - `--spf-cache`: file that persists SPF TXT answers between runs
// - `--populate`: create missing zones before planning (push only)
//
// ## Exit codes
//
// - 0: success, or nothing to change
// - 1: configuration, audit or execution error
// - 2: preview found corrections to make
//
// ## Example
//
// ```bash
// export CLOUDFLARE_TOKEN=your_token
// dnsctl preview --config dnsconfig.json --domains example.com
// dnsctl push --populate
// ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dnsctl_core::config::{self, DnsDocument, DomainDocument, EngineConfig, ProviderCredentials};
use dnsctl_core::rtype::{self, RTypeRegistry};
use dnsctl_core::spf::{CachedResolver, LiveResolver, SpfCacheFile, TxtCache};
use dnsctl_core::{Engine, EngineEvent, Mode, ProviderRegistry, RunReport, audit};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for the different outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DnsctlExitCode {
    /// Nothing failed and nothing is pending
    Success = 0,
    /// Configuration, audit or execution error
    Failure = 1,
    /// Preview found corrections
    ChangesPending = 2,
}

impl DnsctlExitCode {
    fn from_report(report: &RunReport) -> Self {
        match report.exit_code() {
            0 => Self::Success,
            2 => Self::ChangesPending,
            _ => Self::Failure,
        }
    }
}

impl From<DnsctlExitCode> for ExitCode {
    fn from(code: DnsctlExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Parser, Debug)]
#[command(name = "dnsctl", author, version, about = "Declarative DNS configuration", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DNSCTL_LOG_LEVEL", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan every domain and print the corrections
    Preview(RunArgs),
    /// Plan every domain and execute the corrections
    Push(RunArgs),
    /// Lower and audit the document without contacting providers
    Check(DocumentArgs),
    /// Print the lowered document as JSON
    PrintIr(PrintIrArgs),
}

#[derive(Args, Debug, Clone)]
struct DocumentArgs {
    /// Desired-state document
    #[arg(long, short = 'c', env = "DNSCTL_CONFIG", default_value = "dnsconfig.json")]
    config: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct PrintIrArgs {
    #[command(flatten)]
    document: DocumentArgs,

    /// Print the raw document without lowering it
    #[arg(long)]
    raw: bool,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    #[command(flatten)]
    document: DocumentArgs,

    /// Credentials file
    #[arg(long, env = "DNSCTL_CREDS", default_value = "creds.json")]
    creds: PathBuf,

    /// Only these domains (comma-separated)
    #[arg(long, value_delimiter = ',')]
    domains: Vec<String>,

    /// Only these provider instances (comma-separated)
    #[arg(long, value_delimiter = ',')]
    providers: Vec<String>,

    /// Persist SPF TXT answers in this file
    #[arg(long)]
    spf_cache: Option<PathBuf>,

    /// Create missing zones before planning
    #[arg(long)]
    populate: bool,

    /// Concurrent corrections per provider
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Print the run report as JSON instead of text
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            concurrency: self.concurrency,
            populate: self.populate,
            domains: self.domains.clone(),
            providers: self.providers.clone(),
            ..EngineConfig::default()
        }
    }
}

fn parse_log_level(value: &str) -> Result<Level> {
    match value.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "Log level '{}' is not valid. Valid levels: trace, debug, info, warn, error",
            value
        ),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match parse_log_level(&cli.log_level) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DnsctlExitCode::Failure.into();
        }
    };

    // Logs go to stderr; stdout carries the plan.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DnsctlExitCode::Failure.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DnsctlExitCode::Failure.into();
        }
    };

    let result = rt.block_on(async move {
        match cli.command {
            Command::Preview(args) => run(args, Mode::Preview).await,
            Command::Push(args) => run(args, Mode::Push).await,
            Command::Check(args) => check(args).await,
            Command::PrintIr(args) => print_ir(args).await,
        }
    });

    match result {
        Ok(code) => code.into(),
        Err(e) => {
            error!("{:#}", e);
            DnsctlExitCode::Failure.into()
        }
    }
}

/// Register every built-in provider and record type, then freeze the
/// record-type registry.
fn build_registries() -> Result<ProviderRegistry> {
    #[allow(unused_mut)]
    let mut rtypes = RTypeRegistry::with_builtins()?;
    #[allow(unused_mut)]
    let mut providers = ProviderRegistry::with_builtins();

    #[cfg(feature = "cloudflare")]
    {
        debug!("Registering Cloudflare provider");
        dnsctl_provider_cloudflare::register(&mut providers)?;
        dnsctl_provider_cloudflare::register_rtypes(&mut rtypes)?;
    }

    #[cfg(feature = "bind")]
    {
        debug!("Registering BIND provider");
        dnsctl_provider_bind::register(&mut providers)?;
    }

    debug!("Record types: {}", rtypes.names().join(", "));
    rtype::install(rtypes)?;
    Ok(providers)
}

async fn load_document(args: &DocumentArgs) -> Result<DnsDocument> {
    let doc = DnsDocument::load(&args.config).await?;
    info!(
        "Loaded {}: {} domains, {} DNS providers, {} registrars",
        args.config.display(),
        doc.domains.len(),
        doc.dns_providers.len(),
        doc.registrars.len()
    );
    Ok(doc)
}

/// A missing credentials file is fine for providers that need no keys.
async fn load_credentials(path: &Path) -> Result<HashMap<String, ProviderCredentials>> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        warn!("Credentials file {} not found, using empty credentials", path.display());
        return Ok(HashMap::new());
    }
    let creds = config::load_credentials(path).await?;
    debug!("Loaded credentials for {} providers", creds.len());
    Ok(creds)
}

async fn run(args: RunArgs, mode: Mode) -> Result<DnsctlExitCode> {
    let registry = build_registries()?;
    let doc = load_document(&args.document).await?;
    let creds = load_credentials(&args.creds).await?;

    let (engine, events) = Engine::from_document(&doc, &creds, &registry, args.engine_config())
        .context("Failed to construct providers")?;

    let cache = TxtCache::new();
    let cache_file = args.spf_cache.as_ref().map(SpfCacheFile::new);
    if let Some(file) = &cache_file {
        let loaded = file.load_into(&cache).await?;
        info!("Loaded {} SPF cache entries from {}", loaded, file.path().display());
    }
    let engine = engine.with_spf_resolver(Arc::new(CachedResolver::new(
        Arc::new(LiveResolver::new()),
        cache.clone(),
    )));

    let event_logger = tokio::spawn(log_events(ReceiverStream::new(events)));

    let cancel = engine.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the running corrections");
            cancel.cancel();
        }
    });

    let report = engine.run(doc.domain_configs(), mode).await;
    interrupt.abort();
    drop(engine);
    if let Err(e) = event_logger.await {
        warn!("Event logger stopped abnormally: {}", e);
    }

    if let Some(file) = &cache_file {
        if let Err(e) = file.save(&cache).await {
            warn!("Failed to save SPF cache {}: {}", file.path().display(), e);
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(DnsctlExitCode::from_report(&report))
}

async fn log_events(mut events: ReceiverStream<EngineEvent>) {
    while let Some(event) = events.next().await {
        match event {
            EngineEvent::DomainStarted { domain } => debug!("{}: started", domain),
            EngineEvent::CorrectionPlanned { domain, provider, msg } => {
                debug!("{}/{}: planned {}", domain, provider, msg)
            }
            EngineEvent::CorrectionStarted { domain, provider, msg } => {
                debug!("{}/{}: running {}", domain, provider, msg)
            }
            EngineEvent::CorrectionSucceeded { domain, provider, msg } => {
                info!("{}/{}: {}", domain, provider, msg)
            }
            EngineEvent::CorrectionFailed {
                domain,
                provider,
                msg,
                error,
            } => error!("{}/{}: {} failed: {}", domain, provider, msg, error),
            EngineEvent::DomainFinished {
                domain,
                changes,
                errors,
            } => info!("{}: {} changes, {} errors", domain, changes, errors),
        }
    }
}

/// Engine with no providers, for the commands that only lower and audit
fn offline_engine() -> Result<Engine> {
    let (engine, _events) = Engine::new(EngineConfig::default(), Vec::new(), Vec::new())?;
    Ok(engine)
}

async fn check(args: DocumentArgs) -> Result<DnsctlExitCode> {
    build_registries()?;
    let doc = load_document(&args).await?;
    let engine = offline_engine()?;

    let mut failed = false;
    for mut dc in doc.domain_configs() {
        let domain = dc.name.clone();
        match engine.prepare(&mut dc).await {
            Ok(issues) => {
                for issue in &issues {
                    println!("{}: {}", domain, issue);
                }
                if let Err(e) = audit::enforce(&domain, &issues) {
                    error!("{}", e);
                    failed = true;
                } else {
                    info!("{}: {} records OK", domain, dc.records.len());
                }
            }
            Err(e) => {
                println!("{}: {}", domain, e);
                failed = true;
            }
        }
    }

    Ok(if failed {
        DnsctlExitCode::Failure
    } else {
        DnsctlExitCode::Success
    })
}

async fn print_ir(args: PrintIrArgs) -> Result<DnsctlExitCode> {
    build_registries()?;
    let mut doc = load_document(&args.document).await?;

    if !args.raw {
        let engine = offline_engine()?;
        let mut lowered = Vec::with_capacity(doc.domains.len());
        for mut dc in doc.domain_configs() {
            engine
                .prepare(&mut dc)
                .await
                .with_context(|| format!("Failed to lower {}", dc.name))?;
            lowered.push(DomainDocument::from_domain_config(&dc));
        }
        doc.domains = lowered;
    }

    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(DnsctlExitCode::Success)
}

/// Human-readable plan, one block per domain
fn render_report(report: &RunReport) -> String {
    let mut out = String::new();
    for domain in &report.domains {
        let _ = writeln!(out, "******************** Domain: {}", domain.domain);
        for issue in &domain.audit {
            let _ = writeln!(out, "{}", issue);
        }
        for err in &domain.errors {
            let _ = writeln!(out, "ERROR: {}", err);
        }
        for provider in domain.providers.iter() {
            render_provider(&mut out, "DNS Provider", provider);
        }
        if let Some(registrar) = &domain.registrar {
            render_provider(&mut out, "Registrar", registrar);
        }
    }

    let _ = writeln!(
        out,
        "Done. {} corrections, {} errors.",
        report.total_changes(),
        report.total_errors()
    );
    out
}

fn render_provider(out: &mut String, kind: &str, provider: &dnsctl_core::engine::ProviderReport) {
    if provider.corrections.is_empty() && provider.errors.is_empty() {
        return;
    }
    let _ = writeln!(
        out,
        "----- {}: {}...{} corrections",
        kind,
        provider.name,
        provider.corrections.len()
    );
    for (i, msg) in provider.corrections.iter().enumerate() {
        let _ = writeln!(out, "#{}: {}", i + 1, msg.replace('\n', "\n    "));
    }
    for err in &provider.errors {
        let _ = writeln!(out, "FAILURE! {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnsctl_core::engine::{DomainReport, ProviderReport};

    #[test]
    fn run_flags_become_engine_config() {
        let cli = Cli::try_parse_from([
            "dnsctl",
            "preview",
            "--config",
            "zones.json",
            "--domains",
            "example.com,example.org",
            "--providers",
            "bind",
            "--populate",
        ])
        .unwrap();

        let Command::Preview(args) = cli.command else {
            panic!("expected preview");
        };
        assert_eq!(args.document.config, PathBuf::from("zones.json"));
        let config = args.engine_config();
        assert_eq!(config.domains, vec!["example.com", "example.org"]);
        assert_eq!(config.providers, vec!["bind"]);
        assert!(config.populate);
        assert_eq!(config.concurrency, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn subcommands_parse() {
        let cli = Cli::try_parse_from(["dnsctl", "print-ir", "--raw", "-c", "a.json"]).unwrap();
        assert!(matches!(cli.command, Command::PrintIr(PrintIrArgs { raw: true, .. })));

        let cli = Cli::try_parse_from(["dnsctl", "--log-level", "debug", "check"]).unwrap();
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Command::Check(_)));

        assert!(Cli::try_parse_from(["dnsctl", "apply"]).is_err());
    }

    #[test]
    fn log_levels() {
        assert_eq!(parse_log_level("INFO").unwrap(), Level::INFO);
        assert_eq!(parse_log_level("trace").unwrap(), Level::TRACE);
        assert!(parse_log_level("verbose").is_err());
    }

    #[tokio::test]
    async fn document_and_credentials_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("dnsconfig.json");
        tokio::fs::write(
            &config,
            r#"{
                "registrars": [{"name": "none", "type": "NONE"}],
                "dns_providers": [{"name": "bind", "type": "BIND"}],
                "domains": [
                    {"name": "example.com", "registrar": "none", "dnsProviders": {"bind": -1},
                     "records": [{"type": "A", "args": ["@", "192.0.2.1"]}]},
                    {"name": "example.org", "registrar": "none", "dnsProviders": {"bind": 0}}
                ]
            }"#,
        )
        .await
        .unwrap();

        let doc = load_document(&DocumentArgs { config }).await.unwrap();
        assert_eq!(doc.domains.len(), 2);
        assert_eq!(doc.dns_providers.len(), 1);

        let creds_path = dir.path().join("creds.json");
        assert!(load_credentials(&creds_path).await.unwrap().is_empty());
        tokio::fs::write(&creds_path, r#"{"bind": {"directory": "zones"}}"#)
            .await
            .unwrap();
        let creds = load_credentials(&creds_path).await.unwrap();
        assert_eq!(creds["bind"].get("directory"), Some("zones"));

        let missing = DocumentArgs {
            config: dir.path().join("absent.json"),
        };
        assert!(load_document(&missing).await.is_err());
    }

    fn report(mode: Mode, corrections: &[&str], errors: &[&str]) -> RunReport {
        let mut provider = ProviderReport::default();
        provider.name = "bind".to_string();
        provider.corrections = corrections.iter().map(|c| c.to_string()).collect();
        provider.changes = corrections.len();
        provider.errors = errors.iter().map(|e| e.to_string()).collect();
        let mut domain = DomainReport::default();
        domain.domain = "example.com".to_string();
        domain.providers.push(provider);
        RunReport {
            mode,
            domains: vec![domain],
        }
    }

    #[test]
    fn plan_is_rendered_per_provider() {
        let text = render_report(&report(
            Mode::Preview,
            &["+ CREATE A www.example.com 192.0.2.1 ttl=300\nWrite zone file zones/example.com.zone"],
            &[],
        ));
        assert!(text.contains("******************** Domain: example.com"));
        assert!(text.contains("----- DNS Provider: bind...1 corrections"));
        assert!(text.contains("#1: + CREATE A www.example.com"));
        assert!(text.contains("\n    Write zone file"));
        assert!(text.ends_with("Done. 1 corrections, 0 errors.\n"));
    }

    #[test]
    fn exit_codes_follow_the_report() {
        assert_eq!(
            DnsctlExitCode::from_report(&report(Mode::Preview, &[], &[])),
            DnsctlExitCode::Success
        );
        assert_eq!(
            DnsctlExitCode::from_report(&report(Mode::Preview, &["change"], &[])),
            DnsctlExitCode::ChangesPending
        );
        assert_eq!(
            DnsctlExitCode::from_report(&report(Mode::Push, &["change"], &[])),
            DnsctlExitCode::Success
        );
        assert_eq!(
            DnsctlExitCode::from_report(&report(Mode::Push, &["change"], &["boom"])),
            DnsctlExitCode::Failure
        );
    }
}
