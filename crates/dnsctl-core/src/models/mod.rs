//! Data model of the reconciliation pipeline
//!
//! - [`RecordConfig`]: one desired or observed DNS record
//! - [`DomainConfig`]: the desired state of one zone
//! - [`Correction`]: a planned change and the thunk that applies it

pub mod correction;
pub mod domain;
pub mod record;

pub use correction::{Correction, CorrectionFn};
pub use domain::{DomainConfig, Nameserver, NameserverCount, ProviderRef};
pub use record::{ProviderHandle, RecordConfig, RecordData, RecordKey};
