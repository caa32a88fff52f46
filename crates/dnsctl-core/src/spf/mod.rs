//! SPF parsing, lookup accounting and flattening
//!
//! - [`parse`]: parse a `v=spf1` record, resolving includes
//! - [`flatten`]: inline includes and chain overflow records
//! - [`resolver`]: live, preloaded and caching TXT resolvers
//! - [`cache_file`]: on-disk TXT cache for the preloaded resolver

pub mod cache_file;
pub mod flatten;
pub mod parse;
pub mod resolver;

pub use cache_file::SpfCacheFile;
pub use flatten::{FLATTEN_META, FlattenTargets, SPLIT_META, process_domain};
pub use parse::{MAX_LOOKUPS, SpfPart, SpfPartKind, SpfRecord, is_spf, parse};
pub use resolver::{CachedResolver, LiveResolver, PreloadedResolver, SpfResolver, TxtCache};
