use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::{ArgKind, RTypeHandler, RTypeRegistry, arg_str};
use crate::config::RawArg;
use crate::error::{Error, Result};
use crate::models::{RecordConfig, RecordData};

pub(super) fn register(registry: &mut RTypeRegistry) -> Result<()> {
    registry.register(A)?;
    registry.register(Aaaa)
}

struct A;

impl RTypeHandler for A {
    fn name(&self) -> &str {
        "A"
    }

    fn signature(&self) -> &[ArgKind] {
        &[ArgKind::Str]
    }

    fn from_raw(
        &self,
        rc: &mut RecordConfig,
        _origin: &str,
        args: &[RawArg],
        _meta: &BTreeMap<String, String>,
    ) -> Result<()> {
        let text = arg_str(args, 0)?;
        let ip: Ipv4Addr = text
            .trim()
            .parse()
            .map_err(|_| Error::validation(format!("invalid IPv4 address {text:?}")))?;
        rc.data = RecordData::A(ip);
        Ok(())
    }
}

struct Aaaa;

impl RTypeHandler for Aaaa {
    fn name(&self) -> &str {
        "AAAA"
    }

    fn signature(&self) -> &[ArgKind] {
        &[ArgKind::Str]
    }

    fn from_raw(
        &self,
        rc: &mut RecordConfig,
        _origin: &str,
        args: &[RawArg],
        _meta: &BTreeMap<String, String>,
    ) -> Result<()> {
        let text = arg_str(args, 0)?;
        let ip: Ipv6Addr = text
            .trim()
            .parse()
            .map_err(|_| Error::validation(format!("invalid IPv6 address {text:?}")))?;
        rc.data = RecordData::Aaaa(ip);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lift(handler: &dyn RTypeHandler, value: &str) -> Result<RecordConfig> {
        let mut rc = RecordConfig::new(handler.name(), "@", "example.com", RecordData::Fields(vec![]));
        handler.from_raw(&mut rc, "example.com", &[RawArg::Str(value.into())], &BTreeMap::new())?;
        Ok(rc)
    }

    #[test]
    fn ipv6_is_compressed_canonically() {
        let rc = lift(&Aaaa, "2001:0db8:0000:0000:0000:0000:0000:0001").unwrap();
        assert_eq!(rc.data.to_string(), "2001:db8::1");
    }

    #[test]
    fn bad_addresses_are_rejected() {
        assert!(lift(&A, "300.1.1.1").is_err());
        assert!(lift(&Aaaa, "1.2.3.4").is_err());
    }
}
