//! Contract Test: Planning & Idempotency
//!
//! This test verifies that desired state flows from raw tuples through the
//! planner into the provider and back without drift.
//!
//! Constraints verified:
//! - A push followed by a preview plans nothing
//! - Lowered records survive re-serialization unchanged
//! - Name and FQDN stay coherent for every reconciled record
//! - Audit errors stop a zone before the provider is contacted
//! - Declared apex NS records must name one of the domain's nameservers
//!
//! If this test fails, the planner or the record model is broken.

mod common;

use common::*;
use dnsctl_core::config::{RawArg, RawRecord};
use dnsctl_core::lower::{lower_domain, lower_record};
use dnsctl_core::models::{DomainConfig, Nameserver, RecordData};
use dnsctl_core::normalize::{encode_wire, txt};
use dnsctl_core::{Mode, RTypeRegistry};
use tokio_test::assert_ok;

fn raw(rtype: &str, label: &str, payload: Vec<RawArg>) -> RawRecord {
    RawRecord::new(rtype, label, payload)
}

fn s(v: &str) -> RawArg {
    RawArg::Str(v.to_string())
}

fn i(v: i64) -> RawArg {
    RawArg::Int(v)
}

fn sample_raws() -> Vec<RawRecord> {
    vec![
        raw("A", "@", vec![s("198.51.100.7")]).with_ttl(300),
        raw("AAAA", "www", vec![s("2001:db8::1")]),
        raw("CNAME", "docs", vec![s("pages.example.net.")]),
        raw("MX", "@", vec![i(10), s("mx1.example.net.")]),
        raw("MX", "@", vec![i(20), s("mx2.example.net.")]),
        raw("TXT", "@", vec![s("v=spf1 -all")]),
        raw("SRV", "_sip._tcp", vec![i(10), i(60), i(5060), s("sip.example.com.")]),
        raw("CAA", "@", vec![i(0), s("issue"), s("letsencrypt.org")]),
        raw("TLSA", "_443._tcp.www", vec![i(3), i(1), i(1), s("abcdef0123")]),
        raw("HTTPS", "@", vec![i(1), s("."), s("alpn=h2")]),
    ]
}

#[tokio::test]
async fn apex_a_record_create_then_converge() {
    // S1: one CREATE, then nothing

    let provider = MemoryProvider::new();
    let (engine, _rx) = engine_with(vec![provider.instance("p1")], vec![]);
    let dc = domain(vec![a("@", [198, 51, 100, 7], 300)]);

    let report = engine.run(vec![dc.clone()], Mode::Push).await;
    let corrections = &report.domains[0].providers[0].corrections;
    assert_eq!(corrections.len(), 1);
    assert!(corrections[0].contains("CREATE A example.com 198.51.100.7 ttl=300"));
    assert_eq!(report.exit_code(), 0);
    assert_eq!(provider.applied(), 1);

    let again = engine.run(vec![dc], Mode::Preview).await;
    assert_eq!(again.total_changes(), 0);
    assert!(again.domains[0].providers[0].corrections.is_empty());
    assert_eq!(again.exit_code(), 0);
}

#[tokio::test]
async fn second_plan_after_apply_is_empty() {
    // Idempotence over every built-in record kind

    let provider = MemoryProvider::new();
    let (engine, _rx) = engine_with(vec![provider.instance("p1")], vec![]);
    let mut dc = domain(Vec::new());
    dc.raw_records = sample_raws();

    let first = engine.run(vec![dc.clone()], Mode::Push).await;
    assert!(!first.has_errors(), "first push failed: {:?}", first.domains);
    assert_eq!(first.total_changes(), sample_raws().len());

    let second = engine.run(vec![dc], Mode::Preview).await;
    assert_eq!(
        second.total_changes(),
        0,
        "second plan not empty: {:?}",
        second.domains[0].providers[0].corrections
    );
}

#[tokio::test]
async fn changed_desired_state_plans_minimal_corrections() {
    let provider = MemoryProvider::new();
    provider.seed(
        "example.com",
        vec![
            a("www", [192, 0, 2, 1], 300),
            a("old", [192, 0, 2, 9], 300),
            a("api", [192, 0, 2, 5], 300),
        ],
    );
    let (engine, _rx) = engine_with(vec![provider.instance("p1")], vec![]);
    let dc = domain(vec![
        a("www", [192, 0, 2, 2], 300),
        a("api", [192, 0, 2, 5], 600),
        a("new", [192, 0, 2, 7], 300),
    ]);

    let report = engine.run(vec![dc.clone()], Mode::Push).await;
    let msgs = &report.domains[0].providers[0].corrections;
    assert_eq!(msgs.len(), 4);
    assert!(msgs.iter().any(|m| m.starts_with("- DELETE A old.example.com")));
    assert!(msgs.iter().any(|m| m.starts_with("+ CREATE A new.example.com")));
    assert!(msgs.iter().any(|m| m.contains("CHANGE A www.example.com 192.0.2.1 -> 192.0.2.2")));
    assert!(msgs.iter().any(|m| m.contains("CHANGE-TTL A api.example.com")));

    let again = engine.run(vec![dc], Mode::Preview).await;
    assert_eq!(again.total_changes(), 0);
}

#[tokio::test]
async fn txt_multi_chunk_round_trips_through_provider() {
    // S2: 600 octets become 255 + 255 + 90

    let registry = assert_ok!(RTypeRegistry::with_builtins());
    let long = "a".repeat(600);
    let rc = assert_ok!(lower_record(
        &raw("TXT", "@", vec![s(&long)]),
        "example.com",
        &registry
    ));

    let RecordData::Txt(chunks) = &rc.data else {
        panic!("expected TXT payload, got {:?}", rc.data);
    };
    let lengths: Vec<usize> = chunks.iter().map(String::len).collect();
    assert_eq!(lengths, vec![255, 255, 90]);
    assert!(lengths.iter().all(|n| *n <= txt::TXT_CHUNK_MAX));
    assert_eq!(
        encode_wire(chunks),
        format!("\"{}\"\"{}\"\"{}\"", "a".repeat(255), "a".repeat(255), "a".repeat(90))
    );
    assert_eq!(assert_ok!(txt::decode_wire(&encode_wire(chunks))), *chunks);

    let provider = MemoryProvider::new();
    let (engine, _rx) = engine_with(vec![provider.instance("p1")], vec![]);
    let dc = domain(vec![rc.with_ttl(300)]);
    engine.run(vec![dc.clone()], Mode::Push).await;
    assert_eq!(provider.records("example.com")[0].txt_joined(), Some(long));

    let again = engine.run(vec![dc], Mode::Preview).await;
    assert_eq!(again.total_changes(), 0);
}

#[tokio::test]
async fn cname_at_apex_is_rejected_before_planning() {
    // S3

    let provider = MemoryProvider::new();
    let (engine, _rx) = engine_with(vec![provider.instance("p1")], vec![]);
    let mut dc = domain(Vec::new());
    dc.raw_records = vec![raw("CNAME", "@", vec![s("other.example.net.")])];

    let report = engine.run(vec![dc], Mode::Push).await;
    let domain_report = &report.domains[0];
    assert!(
        domain_report
            .errors
            .iter()
            .any(|e| e.contains("CNAME at apex (@) not allowed")),
        "errors: {:?}",
        domain_report.errors
    );
    assert!(domain_report.providers.is_empty());
    assert_eq!(provider.get_records_calls(), 0);
    assert_eq!(provider.applied(), 0);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn apex_ns_records_are_checked_against_nameservers() {
    let provider = MemoryProvider::new();
    let (engine, _rx) = engine_with(vec![provider.instance("p1")], vec![]);
    let mut dc = domain(Vec::new());
    dc.nameservers = vec![Nameserver::from("ns1.example.net"), Nameserver::from("ns2.example.net")];
    dc.raw_records = vec![
        raw("NS", "@", vec![s("ns1.example.net.")]),
        raw("NS", "@", vec![s("stray.example.org.")]),
    ];

    let report = engine.run(vec![dc.clone()], Mode::Push).await;
    let errors = &report.domains[0].errors;
    assert!(
        errors.iter().any(|e| e.contains("stray.example.org")),
        "errors: {:?}",
        errors
    );
    assert_eq!(provider.get_records_calls(), 0);
    assert_eq!(report.exit_code(), 1);

    // Matching apex NS records are accepted and not duplicated.
    dc.raw_records.truncate(1);
    let report = engine.run(vec![dc], Mode::Push).await;
    assert!(report.domains[0].errors.is_empty());
    let mut apex_ns: Vec<String> = provider
        .records("example.com")
        .iter()
        .filter(|rc| rc.rtype == "NS" && rc.is_apex())
        .filter_map(|rc| rc.data.target_name().map(str::to_string))
        .collect();
    apex_ns.sort();
    assert_eq!(apex_ns, vec!["ns1.example.net.", "ns2.example.net."]);
}

#[test]
fn lowered_records_survive_reserialization() {
    // Round-trip: FromRaw → document → FromRaw keeps Comparable

    let registry = RTypeRegistry::with_builtins().unwrap();
    for original in sample_raws() {
        let first = lower_record(&original, "example.com", &registry).unwrap();

        let json = serde_json::to_string(&RawRecord::from_record(&first)).unwrap();
        let reparsed: RawRecord = serde_json::from_str(&json).unwrap();
        let second = lower_record(&reparsed, "example.com", &registry).unwrap();

        assert_eq!(
            registry.comparable(&first),
            registry.comparable(&second),
            "{} did not round-trip via {}",
            first.rtype,
            json
        );
        assert_eq!(first.name_fqdn, second.name_fqdn);
        assert_eq!(first.ttl, second.ttl);
    }
}

#[tokio::test]
async fn reconciled_records_keep_name_and_fqdn_coherent() {
    let provider = MemoryProvider::new();
    let (engine, _rx) = engine_with(vec![provider.instance("p1")], vec![]);
    let mut dc = domain(Vec::new());
    dc.raw_records = sample_raws();
    let mut scoped = raw("A", "@", vec![s("192.0.2.44")]);
    scoped.subdomain = "lab".to_string();
    dc.raw_records.push(scoped);

    let report = engine.run(vec![dc], Mode::Push).await;
    assert!(!report.has_errors());

    let records = provider.records("example.com");
    assert!(records.iter().any(|rc| rc.name == "lab" && rc.name_fqdn == "lab.example.com"));
    for rc in records {
        let expected = if rc.name == "@" {
            "example.com".to_string()
        } else {
            format!("{}.example.com", rc.name)
        };
        assert_eq!(rc.name_fqdn, expected, "{} record {}", rc.rtype, rc.name);
    }
}

#[tokio::test]
async fn keep_unknown_and_unmanaged_records_are_left_alone() {
    let provider = MemoryProvider::new();
    provider.seed(
        "example.com",
        vec![
            a("www", [192, 0, 2, 1], 300),
            a("stray", [192, 0, 2, 50], 300),
            a("host.legacy", [192, 0, 2, 60], 300),
        ],
    );
    let (engine, _rx) = engine_with(vec![provider.instance("p1")], vec![]);

    let mut dc = domain(vec![a("www", [192, 0, 2, 1], 300)]);
    dc.unmanaged = vec!["*.legacy".to_string()];
    let report = engine.run(vec![dc.clone()], Mode::Preview).await;
    let msgs = &report.domains[0].providers[0].corrections;
    assert_eq!(msgs.len(), 1, "corrections: {msgs:?}");
    assert!(msgs[0].contains("DELETE A stray.example.com"));

    dc.keep_unknown = true;
    let report = engine.run(vec![dc], Mode::Push).await;
    assert_eq!(report.total_changes(), 0);
    assert_eq!(provider.records("example.com").len(), 3);
}

#[tokio::test]
async fn ensure_absent_deletes_even_with_keep_unknown() {
    let provider = MemoryProvider::new();
    provider.seed(
        "example.com",
        vec![a("www", [192, 0, 2, 1], 300), a("gone", [192, 0, 2, 2], 300)],
    );
    let (engine, _rx) = engine_with(vec![provider.instance("p1")], vec![]);

    let mut dc = domain(vec![a("www", [192, 0, 2, 1], 300)]);
    dc.keep_unknown = true;
    let mut absent = raw("A", "gone", vec![s("192.0.2.2")]).with_ttl(300);
    absent.ensure_absent = true;
    dc.raw_records = vec![absent];

    let report = engine.run(vec![dc], Mode::Push).await;
    assert_eq!(report.total_changes(), 1);
    assert_eq!(provider.records("example.com").len(), 1);
}

#[test]
fn lowering_failure_leaves_domain_unlowered() {
    let registry = RTypeRegistry::with_builtins().unwrap();
    let mut dc = DomainConfig::new("example.com");
    dc.raw_records = vec![
        raw("A", "ok", vec![s("192.0.2.1")]),
        raw("MX", "@", vec![s("ten"), s("mx.example.net.")]),
    ];

    let err = lower_domain(&mut dc, &registry).unwrap_err();
    assert!(err.to_string().contains("MX"));
    assert!(dc.records.is_empty());
    assert_eq!(dc.raw_records.len(), 2);
}
