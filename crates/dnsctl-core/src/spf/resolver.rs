// # SPF resolvers
//
// Two implementations of the same capability, `get_txt(label)`:
//
// - `LiveResolver` asks DNS (hickory)
// - `PreloadedResolver` answers only from a cache loaded from file
//
// The cache is a separate collaborator (`TxtCache`) that can be shared
// between resolvers. `CachedResolver` puts a cache in front of any resolver;
// entries are only ever added, and a stored answer is returned without
// asking upstream again.

use async_trait::async_trait;
use hickory_resolver::TokioResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// Record kind under which TXT answers are cached
pub const TXT_KIND: &str = "txt";

/// Source of TXT answers for SPF evaluation
#[async_trait]
pub trait SpfResolver: Send + Sync {
    /// TXT strings published at `label`, one string per TXT record
    async fn get_txt(&self, label: &str) -> Result<Vec<String>>;
}

/// Process-scoped, additive cache keyed by `(label, kind)`
#[derive(Debug, Clone, Default)]
pub struct TxtCache {
    entries: Arc<Mutex<BTreeMap<(String, String), Vec<String>>>>,
}

fn cache_key(label: &str) -> (String, String) {
    (
        label.trim_end_matches('.').to_ascii_lowercase(),
        TXT_KIND.to_string(),
    )
}

impl TxtCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached TXT answer for `label`
    pub async fn get(&self, label: &str) -> Option<Vec<String>> {
        self.entries.lock().await.get(&cache_key(label)).cloned()
    }

    /// Store an answer unless one is already cached.
    pub async fn insert(&self, label: &str, values: Vec<String>) {
        self.entries
            .lock()
            .await
            .entry(cache_key(label))
            .or_insert(values);
    }

    /// Number of cached answers
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether nothing is cached
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Copy of the cache as `label → kind → values`
    pub async fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, Vec<String>>> {
        let mut out: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
        for ((label, kind), values) in self.entries.lock().await.iter() {
            out.entry(label.clone())
                .or_default()
                .insert(kind.clone(), values.clone());
        }
        out
    }

    /// Add every entry of a `label → kind → values` map.
    pub async fn extend(&self, entries: BTreeMap<String, BTreeMap<String, Vec<String>>>) {
        let mut guard = self.entries.lock().await;
        for (label, kinds) in entries {
            for (kind, values) in kinds {
                guard
                    .entry((label.to_ascii_lowercase(), kind.to_ascii_lowercase()))
                    .or_insert(values);
            }
        }
    }
}

/// Resolver that queries DNS
pub struct LiveResolver {
    resolver: TokioResolver,
}

impl LiveResolver {
    /// Resolver using the system configuration defaults
    pub fn new() -> Self {
        let provider = TokioConnectionProvider::default();
        let resolver = TokioResolver::builder_with_config(ResolverConfig::default(), provider)
            .with_options(ResolverOpts::default())
            .build();
        Self { resolver }
    }
}

impl Default for LiveResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpfResolver for LiveResolver {
    async fn get_txt(&self, label: &str) -> Result<Vec<String>> {
        tracing::debug!("Resolving TXT {}", label);
        let response = self
            .resolver
            .txt_lookup(label)
            .await
            .map_err(|e| Error::spf(format!("TXT lookup of {label} failed: {e}")))?;
        Ok(response
            .iter()
            .map(|txt| {
                txt.iter()
                    .map(|data| String::from_utf8_lossy(data).to_string())
                    .collect::<String>()
            })
            .collect())
    }
}

/// Resolver that answers only from a preloaded cache
pub struct PreloadedResolver {
    cache: TxtCache,
}

impl PreloadedResolver {
    /// Answer from `cache`
    pub fn new(cache: TxtCache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl SpfResolver for PreloadedResolver {
    async fn get_txt(&self, label: &str) -> Result<Vec<String>> {
        self.cache
            .get(label)
            .await
            .ok_or_else(|| Error::spf(format!("no cached TXT answer for {label}")))
    }
}

/// Cache in front of another resolver
pub struct CachedResolver {
    upstream: Arc<dyn SpfResolver>,
    cache: TxtCache,
}

impl CachedResolver {
    /// Wrap `upstream`, storing answers in `cache`
    pub fn new(upstream: Arc<dyn SpfResolver>, cache: TxtCache) -> Self {
        Self { upstream, cache }
    }

    /// The shared cache
    pub fn cache(&self) -> &TxtCache {
        &self.cache
    }
}

#[async_trait]
impl SpfResolver for CachedResolver {
    async fn get_txt(&self, label: &str) -> Result<Vec<String>> {
        if let Some(hit) = self.cache.get(label).await {
            tracing::trace!("TXT cache hit for {}", label);
            return Ok(hit);
        }
        let values = self.upstream.get_txt(label).await?;
        self.cache.insert(label, values.clone()).await;
        Ok(values)
    }
}
