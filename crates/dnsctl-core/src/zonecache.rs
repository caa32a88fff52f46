// # ZoneCache
//
// Per-provider cache of the provider's zone listing. The first read runs the
// `fetch_all` closure while holding the cache mutex, so concurrent readers
// wait for a single fetch. The listing is never invalidated.
//
// `fetch_all` must not call back into the same cache.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::Mutex;

use crate::error::{Error, Result};

type FetchAll<Z> = Box<dyn Fn() -> BoxFuture<'static, Result<HashMap<String, Z>>> + Send + Sync>;

struct State<Z> {
    zones: Option<HashMap<String, Z>>,
    // Zones set before the first fetch; merged over the fetched listing.
    pending: HashMap<String, Z>,
}

/// Single-flight cache of a provider's zones
pub struct ZoneCache<Z> {
    fetch_all: FetchAll<Z>,
    state: Mutex<State<Z>>,
}

impl<Z: Clone + Send + 'static> ZoneCache<Z> {
    /// Create a cache around a listing function.
    pub fn new<F, Fut>(fetch_all: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HashMap<String, Z>>> + Send + 'static,
    {
        Self {
            fetch_all: Box::new(move || Box::pin(fetch_all())),
            state: Mutex::new(State {
                zones: None,
                pending: HashMap::new(),
            }),
        }
    }

    async fn with_zones<T>(&self, f: impl FnOnce(&HashMap<String, Z>) -> T) -> Result<T> {
        let mut state = self.state.lock().await;
        if state.zones.is_none() {
            tracing::debug!("Fetching zone listing");
            let fetched = (self.fetch_all)().await?;
            let mut zones: HashMap<String, Z> = fetched
                .into_iter()
                .map(|(name, z)| (normalize(&name), z))
                .collect();
            zones.extend(state.pending.drain());
            tracing::debug!("Cached {} zones", zones.len());
            state.zones = Some(zones);
        }
        match &state.zones {
            Some(zones) => Ok(f(zones)),
            None => Err(Error::Other("zone cache is empty after fetch".into())),
        }
    }

    /// Whether the provider has a zone called `name`
    pub async fn has_zone(&self, name: &str) -> Result<bool> {
        let key = normalize(name);
        self.with_zones(|zones| zones.contains_key(&key)).await
    }

    /// The zone called `name`, or [`Error::NotFound`]
    pub async fn get_zone(&self, name: &str) -> Result<Z> {
        let key = normalize(name);
        self.with_zones(|zones| zones.get(&key).cloned())
            .await?
            .ok_or_else(|| Error::not_found(format!("zone {name}")))
    }

    /// Every zone name, sorted
    pub async fn get_zone_names(&self) -> Result<Vec<String>> {
        let mut names = self
            .with_zones(|zones| zones.keys().cloned().collect::<Vec<_>>())
            .await?;
        names.sort();
        Ok(names)
    }

    /// Record a zone without fetching, overwriting any cached entry.
    pub async fn set_zone(&self, name: &str, zone: Z) {
        let mut state = self.state.lock().await;
        let key = normalize(name);
        match state.zones.as_mut() {
            Some(zones) => {
                zones.insert(key, zone);
            }
            None => {
                state.pending.insert(key, zone);
            }
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_cache(calls: Arc<AtomicUsize>) -> ZoneCache<u32> {
        ZoneCache::new(move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(HashMap::from([
                    ("Example.com.".to_string(), 1),
                    ("example.net".to_string(), 2),
                ]))
            }
        })
    }

    #[tokio::test]
    async fn concurrent_readers_fetch_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(counting_cache(Arc::clone(&calls)));

        let readers: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.has_zone("example.com").await })
            })
            .collect();
        for reader in futures::future::join_all(readers).await {
            assert!(reader.unwrap().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(cache.get_zone("example.net").await.unwrap(), 2);
        assert_eq!(
            cache.get_zone_names().await.unwrap(),
            vec!["example.com", "example.net"]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_zone_is_not_found() {
        let cache = counting_cache(Arc::new(AtomicUsize::new(0)));
        assert!(matches!(
            cache.get_zone("nope.org").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn set_zone_overrides_fetched_entry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(Arc::clone(&calls));
        cache.set_zone("example.com", 7).await;
        cache.set_zone("new.org", 9).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(cache.get_zone("example.com").await.unwrap(), 7);
        assert_eq!(cache.get_zone("new.org").await.unwrap(), 9);
        cache.set_zone("example.net", 5).await;
        assert_eq!(cache.get_zone("example.net").await.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache: ZoneCache<u32> = ZoneCache::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(Error::http("connection reset"))
                } else {
                    Ok(HashMap::new())
                }
            }
        });
        assert!(cache.has_zone("x.com").await.is_err());
        assert!(!cache.has_zone("x.com").await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
