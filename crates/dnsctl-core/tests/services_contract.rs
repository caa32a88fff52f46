//! Contract Test: Shared Services
//!
//! This test verifies the services providers and the planner lean on.
//!
//! Constraints verified:
//! - The zone cache fetches once for any number of concurrent readers
//! - The domain tree matches added names and wildcard subtrees only
//! - IP transforms shift by offset and expand only through the list form
//! - SPF lookup accounting follows includes recursively
//!
//! If this test fails, a service contract consumed by providers is broken.

mod common;

use common::*;
use dnsctl_core::DomainTree;
use dnsctl_core::ZoneCache;
use dnsctl_core::error::Error;
use dnsctl_core::models::{DomainConfig, RecordData};
use dnsctl_core::spf::{self, FLATTEN_META};
use dnsctl_core::transform::{self, TRANSFORM_META};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_test::assert_ok;

#[tokio::test]
async fn zone_cache_fetches_once_for_concurrent_readers() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fetches);
    let cache: Arc<ZoneCache<u32>> = Arc::new(ZoneCache::new(move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(HashMap::from([
                ("example.com".to_string(), 1),
                ("Example.ORG.".to_string(), 2),
            ]))
        }
    }));

    let readers: Vec<_> = (0..16)
        .map(|i| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                if i % 2 == 0 {
                    cache.get_zone("example.com").await
                } else {
                    cache.get_zone("example.org").await
                }
            })
        })
        .collect();
    for (i, reader) in readers.into_iter().enumerate() {
        let zone = reader.await.unwrap().unwrap();
        assert_eq!(zone, if i % 2 == 0 { 1 } else { 2 });
    }

    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert!(matches!(cache.get_zone("missing.net").await, Err(Error::NotFound(_))));
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn zone_cache_failed_fetch_is_retried() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fetches);
    let cache: ZoneCache<()> = ZoneCache::new(move || {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt == 0 {
                Err(Error::http("timeout"))
            } else {
                Ok(HashMap::from([("example.com".to_string(), ())]))
            }
        }
    });

    assert!(cache.has_zone("example.com").await.is_err());
    assert!(assert_ok!(cache.has_zone("example.com").await));
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}

#[test]
fn domain_tree_wildcards_cover_subdomains_only() {
    // S5

    let mut tree = DomainTree::new();
    tree.add("example.com", "*.other");
    tree.add("example.com", "specific");
    tree.add("example.nl", "specific");

    assert!(tree.get("any.other.example.com"));
    assert!(tree.get("deep.any.other.example.com"));
    assert!(tree.get("specific.example.com"));
    assert!(tree.get("specific.example.nl"));
    assert!(!tree.get("example.nl"));
    assert!(!tree.get("other.nl"));
    assert!(!tree.get("unrelated.example.com"));
    assert!(!tree.get("specific.example.org"));
}

#[test]
fn ip_transform_shifts_by_offset() {
    let rules = assert_ok!(transform::decode_transform_table(
        "10.0.0.0~10.0.0.255~192.0.2.0~;10.0.1.0~10.0.1.9~198.51.100.100~"
    ));
    for host in 0..=255u8 {
        let ip = Ipv4Addr::new(10, 0, 0, host);
        assert_eq!(
            assert_ok!(transform::transform_ip(ip, &rules)),
            Ipv4Addr::new(192, 0, 2, host)
        );
    }
    for host in 0..=9u8 {
        assert_eq!(
            transform::transform_ip(Ipv4Addr::new(10, 0, 1, host), &rules).unwrap(),
            Ipv4Addr::new(198, 51, 100, 100 + host)
        );
    }
    // Outside every range: unchanged.
    let outside = Ipv4Addr::new(10, 0, 2, 1);
    assert_eq!(transform::transform_ip(outside, &rules).unwrap(), outside);
}

#[test]
fn ip_transform_expansion() {
    // S6

    let rules = transform::decode_transform_table("10.0.0.0~10.0.0.0~~192.0.2.1,192.0.2.2").unwrap();
    let ip = Ipv4Addr::new(10, 0, 0, 0);
    assert_eq!(
        transform::transform_ip_to_list(ip, &rules).unwrap(),
        vec![Ipv4Addr::new(192, 0, 2, 1), Ipv4Addr::new(192, 0, 2, 2)]
    );
    assert!(matches!(transform::transform_ip(ip, &rules), Err(Error::Transform(_))));
}

#[test]
fn invalid_transform_table_is_a_configuration_error() {
    assert!(transform::decode_transform_table("10.0.0.9~10.0.0.1~192.0.2.0~").is_err());
    assert!(transform::decode_transform_table("10.0.0.0~10.0.0.1").is_err());
    assert!(transform::decode_transform_table("10.0.0.0~10.0.0.1~192.0.2.0~192.0.2.9").is_err());
}

#[test]
fn transform_metadata_rewrites_a_records() {
    let mut dc = DomainConfig::new("example.com")
        .with_record(a("www", [10, 0, 0, 0], 300).with_meta(TRANSFORM_META, "10.0.0.0~10.0.0.0~~192.0.2.1,192.0.2.2"))
        .with_record(a("mail", [10, 0, 0, 0], 300));
    transform::apply_transforms(&mut dc).unwrap();

    let www: Vec<_> = dc.records.iter().filter(|rc| rc.name == "www").collect();
    assert_eq!(www.len(), 2);
    assert!(www.iter().all(|rc| rc.meta(TRANSFORM_META).is_none()));
    assert_eq!(www[0].data, RecordData::A(Ipv4Addr::new(192, 0, 2, 1)));
    let mail = dc.records.iter().find(|rc| rc.name == "mail").unwrap();
    assert_eq!(mail.data, RecordData::A(Ipv4Addr::new(10, 0, 0, 0)));
}

#[tokio::test]
async fn spf_nested_include_counts_every_lookup() {
    // S4

    let resolver = StaticResolver::new(&[
        ("a.example.com", "v=spf1 ip4:1.1.1.1 ~all"),
        ("b.example.com", "v=spf1 include:a.example.com ~all"),
    ]);
    let record = assert_ok!(spf::parse("v=spf1 include:b.example.com ~all", &resolver).await);
    assert_eq!(record.lookups(), 2);
}

#[tokio::test]
async fn spf_lookup_accounting_sums_siblings_and_children() {
    let resolver = StaticResolver::new(&[
        ("a", "v=spf1 include:c include:d -all"),
        ("b", "v=spf1 ip4:192.0.2.1 -all"),
        ("c", "v=spf1 ip4:192.0.2.2 -all"),
        ("d", "v=spf1 ip6:2001:db8::/32 -all"),
    ]);
    let record = spf::parse("v=spf1 include:a include:b ~all", &resolver).await.unwrap();
    assert_eq!(record.lookups(), 4);
    assert_eq!(resolver.calls(), 4);
}

#[tokio::test]
async fn spf_rejects_non_spf_and_unsupported_text() {
    let resolver = StaticResolver::new(&[]);
    assert!(spf::parse("hello world", &resolver).await.is_err());
    assert!(matches!(
        spf::parse("v=spf1 foo:bar -all", &resolver).await,
        Err(Error::UnsupportedMechanism(_))
    ));
    // Nothing after `all` is examined.
    assert!(spf::parse("v=spf1 -all foo:bar", &resolver).await.is_ok());
}

#[tokio::test]
async fn spf_flattening_inlines_tagged_records() {
    let resolver = StaticResolver::new(&[("_spf.mail.example.net", "v=spf1 ip4:192.0.2.0/24 ~all")]);
    let mut rc = a("@", [192, 0, 2, 1], 300);
    rc.rtype = "TXT".to_string();
    rc.set_txt("v=spf1 include:_spf.mail.example.net -all");
    let mut dc = DomainConfig::new("example.com").with_record(rc.with_meta(FLATTEN_META, "*"));

    let issues = spf::process_domain(&mut dc, &resolver).await.unwrap();
    assert!(issues.is_empty(), "{issues:?}");
    assert_eq!(
        dc.records[0].txt_joined().as_deref(),
        Some("v=spf1 ip4:192.0.2.0/24 -all")
    );
    assert!(dc.records[0].meta(FLATTEN_META).is_none());
}
