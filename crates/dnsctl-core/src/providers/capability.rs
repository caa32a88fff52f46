// # Capabilities
//
// Each provider type declares a tri-state support level for a closed set of
// features. Anything not declared is `Cannot`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A feature a provider may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Capability {
    /// Provider signs zones itself
    CanAutoDnssec,
    /// Corrections may run concurrently
    CanConcur,
    /// Provider can create missing zones
    CanCreateZones,
    /// Provider can list its zones
    CanGetZones,
    /// Provider cannot reorder changes internally; deletes must go first
    CanOnlyDiff1Features,
    /// ALIAS records
    CanUseAlias,
    /// CAA records
    CanUseCaa,
    /// DS records
    CanUseDs,
    /// HTTPS records
    CanUseHttps,
    /// PTR records
    CanUsePtr,
    /// SRV records
    CanUseSrv,
    /// SVCB records
    CanUseSvcb,
    /// TLSA records
    CanUseTlsa,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Support level of one capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Support {
    /// Supported
    Can,
    /// The provider's API cannot do this
    Cannot,
    /// The API could, but this adapter does not yet
    Unimplemented,
}

/// Capability matrix of a provider type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Features(BTreeMap<Capability, Support>);

impl Features {
    /// Create an empty matrix (everything `Cannot`)
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style declaration
    pub fn with(mut self, capability: Capability, support: Support) -> Self {
        self.0.insert(capability, support);
        self
    }

    /// Declare several capabilities as `Can`
    pub fn can(mut self, capabilities: &[Capability]) -> Self {
        for capability in capabilities {
            self.0.insert(*capability, Support::Can);
        }
        self
    }

    /// Declared support, `Cannot` when absent
    pub fn support(&self, capability: Capability) -> Support {
        self.0.get(&capability).copied().unwrap_or(Support::Cannot)
    }

    /// Whether the capability is `Can`
    pub fn has(&self, capability: Capability) -> bool {
        self.support(capability) == Support::Can
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undeclared_capabilities_are_cannot() {
        let features = Features::new()
            .can(&[Capability::CanConcur])
            .with(Capability::CanUsePtr, Support::Unimplemented);
        assert!(features.has(Capability::CanConcur));
        assert_eq!(features.support(Capability::CanUsePtr), Support::Unimplemented);
        assert_eq!(features.support(Capability::CanUseAlias), Support::Cannot);
        assert!(!features.has(Capability::CanUseAlias));
    }
}
