//! Name and value normalization shared by the whole pipeline
//!
//! - [`label`]: short label ↔ FQDN conversion, IDN encoding
//! - [`txt`]: TXT chunking and wire quoting
//! - [`fields`]: RFC-1035 field tokenizer

pub mod fields;
pub mod label;
pub mod txt;

pub use fields::{split_fields, unquote};
pub use label::{apply_subdomain, ensure_trailing_dot, fqdn_to_label, name_to_fqdn, to_ascii};
pub use txt::{TXT_CHUNK_MAX, encode_wire, split_chunks};
