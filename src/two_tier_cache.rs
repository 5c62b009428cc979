//! Generic two-tier caching system
//!
//! This module provides a reusable two-tier caching strategy:
//! - L1: In-memory Moka cache (volatile, may be evicted at any time)
//! - L2: One JSON file per key under a cache root (durable across restarts)
//!
//! Values fetched from the origin are written to L2 first and L1 is then
//! populated by re-reading that file, so an L1 hit is always byte-identical
//! to what a cold L2 read would return. Neither tier expires entries.
//!
//! Concurrent cold fetches of one key inside a process can be coalesced into
//! a single origin call.

use moka::future::Cache;
use serde::{Serialize, de::DeserializeOwned};
use std::{
    collections::HashMap,
    fmt::Display,
    hash::Hash,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::{CacheConfig, ShellError};

/// Trait for types that can be cached
pub trait Cacheable: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}
impl<T> Cacheable for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Trait for cache key types
pub trait CacheKey: Display + Hash + Eq + Clone + Send + Sync + 'static {}
impl<T> CacheKey for T where T: Display + Hash + Eq + Clone + Send + Sync + 'static {}

/// Trait for fetching a value from the origin on a cache miss.
///
/// The context `C` carries whatever the origin call needs for this particular
/// lookup (request parameters, credentials).
#[async_trait::async_trait]
pub trait DataFetcher<K, V, C>: Send + Sync
where
    C: Send + Sync + ?Sized,
{
    /// Fetch a value from the origin by key
    async fn fetch(
        &self,
        ctx: &C,
        key: &K,
    ) -> Result<Option<V>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Trait for mapping keys onto durable-tier file names
pub trait KeyFormatter<K>: Send + Sync + 'static {
    /// File name (without directory) holding the value for `key`
    fn file_name(&self, key: &K) -> String;
}

/// Where a cached value was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Volatile in-memory tier
    Memory,
    /// Durable file tier
    Durable,
    /// Fresh from the origin and not cached (the durable write failed)
    Origin,
}

/// A cached value and the tier it came from
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: Arc<V>,
    pub tier: Tier,
}

/// Represents an in-flight origin fetch that other requests can wait on
type FetchOutcome<V> = Option<Result<Option<CacheEntry<V>>, String>>;
type InFlightFetch<V> = tokio::sync::watch::Receiver<FetchOutcome<V>>;
type InFlightSender<V> = tokio::sync::watch::Sender<FetchOutcome<V>>;

/// Guard that ensures in-flight entries are cleaned up even on panic/cancel.
///
/// When dropped, removes the key from the in-flight map and notifies waiters
/// with an error if no result was sent.
struct InFlightGuard<K: CacheKey, V: Cacheable> {
    key: K,
    in_flight: Arc<RwLock<HashMap<K, InFlightFetch<V>>>>,
    tx: Option<InFlightSender<V>>,
}

impl<K: CacheKey, V: Cacheable> InFlightGuard<K, V> {
    fn new(
        key: K,
        in_flight: Arc<RwLock<HashMap<K, InFlightFetch<V>>>>,
        tx: InFlightSender<V>,
    ) -> Self {
        Self {
            key,
            in_flight,
            tx: Some(tx),
        }
    }

    /// Complete the fetch with a result, consuming the guard.
    ///
    /// The key leaves the in-flight map before waiters are notified, so a
    /// lookup issued after this returns starts a fresh fetch.
    async fn complete(mut self, result: Result<Option<CacheEntry<V>>, String>) {
        if let Some(tx) = self.tx.take() {
            self.in_flight.write().await.remove(&self.key);
            let _ = tx.send(Some(result));
        }
    }
}

impl<K: CacheKey, V: Cacheable> Drop for InFlightGuard<K, V> {
    fn drop(&mut self) {
        // tx still set: dropped without complete(), i.e. panic or cancellation
        let Some(tx) = self.tx.take() else {
            return;
        };
        let _ = tx.send(Some(Err("Fetch was cancelled or panicked".to_owned())));

        let key = self.key.clone();
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            let mut guard = in_flight.write().await;
            // Only drop our own entry; a newer fetch may have registered since
            if guard.get(&key).is_some_and(|rx| rx.same_channel(&tx.subscribe())) {
                guard.remove(&key);
            }
        });
    }
}

async fn wait_in_flight<V: Cacheable>(
    mut rx: InFlightFetch<V>,
) -> Result<Option<CacheEntry<V>>, ShellError> {
    loop {
        if let Some(result) = rx.borrow().as_ref() {
            return match result {
                Ok(entry) => Ok(entry.clone()),
                Err(e) => Err(ShellError::Backend(e.clone().into())),
            };
        }
        if rx.changed().await.is_err() {
            return Err(ShellError::Backend("In-flight fetch was cancelled".into()));
        }
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

struct TwoTierCacheInner<K, V>
where
    K: CacheKey,
    V: Cacheable,
{
    l1_cache: Option<Cache<K, Arc<V>>>,
    cache_dir: PathBuf,
    config: CacheConfig,
    /// Track in-flight origin fetches for request coalescing
    in_flight: Arc<RwLock<HashMap<K, InFlightFetch<V>>>>,
}

/// Generic two-tier cache
pub struct TwoTierCache<K, V, KF>
where
    K: CacheKey,
    V: Cacheable,
    KF: KeyFormatter<K>,
{
    inner: Arc<TwoTierCacheInner<K, V>>,
    key_formatter: Arc<KF>,
}

impl<K, V, KF> Clone for TwoTierCache<K, V, KF>
where
    K: CacheKey,
    V: Cacheable,
    KF: KeyFormatter<K>,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            key_formatter: Arc::clone(&self.key_formatter),
        }
    }
}

impl<K, V, KF> TwoTierCache<K, V, KF>
where
    K: CacheKey,
    V: Cacheable,
    KF: KeyFormatter<K>,
{
    /// Create a new two-tier cache. The durable root is created lazily on
    /// first write.
    pub fn new(config: CacheConfig, key_formatter: KF) -> Self {
        let l1_cache = (config.l1_max_capacity > 0).then(|| {
            Cache::builder()
                .max_capacity(config.l1_max_capacity)
                .build()
        });

        Self {
            inner: Arc::new(TwoTierCacheInner {
                l1_cache,
                cache_dir: config.cache_dir.clone(),
                config,
                in_flight: Arc::new(RwLock::new(HashMap::new())),
            }),
            key_formatter: Arc::new(key_formatter),
        }
    }

    /// Path of the durable-tier file for `key`
    pub fn path_for(&self, key: &K) -> PathBuf {
        self.inner.cache_dir.join(self.key_formatter.file_name(key))
    }

    /// Get value by key, L1 first, then L2
    pub async fn get(&self, key: &K) -> Option<CacheEntry<V>> {
        if let Some(l1) = &self.inner.l1_cache
            && let Some(value) = l1.get(key).await
        {
            debug!("Cache hit L1 for key: {}", key);
            return Some(CacheEntry {
                value,
                tier: Tier::Memory,
            });
        }

        debug!("Cache miss L1 for key: {}", key);

        let path = self.path_for(key);
        let value = self.read_durable(key, &path).await?;
        debug!("Cache hit L2 for key: {}", key);
        self.populate_l1(key, &value).await;
        Some(CacheEntry {
            value,
            tier: Tier::Durable,
        })
    }

    /// Store a value: L2 first, then L1 from a re-read of the L2 file.
    pub async fn put(&self, key: &K, value: &V) -> Result<CacheEntry<V>, ShellError> {
        let path = self.path_for(key);
        let json = serde_json::to_vec(value)?;
        write_atomic(&path, &json).await?;

        let bytes = tokio::fs::read(&path).await?;
        let stored: V = serde_json::from_slice(&bytes)?;
        let stored = Arc::new(stored);
        self.populate_l1(key, &stored).await;
        debug!("Cached value for key {} at {}", key, path.display());

        Ok(CacheEntry {
            value: stored,
            tier: Tier::Durable,
        })
    }

    /// Get value by key, fetching from the origin on a miss.
    ///
    /// A successful fetch is cached; if caching fails the fetched value is
    /// still returned, tagged [`Tier::Origin`].
    pub async fn get_or_fetch<F, C>(
        &self,
        key: &K,
        fetcher: &F,
        ctx: &C,
    ) -> Result<Option<CacheEntry<V>>, ShellError>
    where
        F: DataFetcher<K, V, C> + ?Sized,
        C: Send + Sync + ?Sized,
    {
        if let Some(entry) = self.get(key).await {
            return Ok(Some(entry));
        }

        if !self.inner.config.coalesce_fetches {
            return self.fetch_and_store(key, fetcher, ctx).await;
        }

        let pending = self.inner.in_flight.read().await.get(key).cloned();
        if let Some(rx) = pending {
            debug!("Waiting for in-flight fetch for key: {}", key);
            return wait_in_flight(rx).await;
        }

        let (tx, rx) = tokio::sync::watch::channel(None);
        let guard = {
            let mut in_flight = self.inner.in_flight.write().await;
            // Another task may have registered while we waited for the write lock
            if let Some(existing) = in_flight.get(key).cloned() {
                drop(in_flight);
                debug!("Waiting for in-flight fetch for key (race): {}", key);
                return wait_in_flight(existing).await;
            }
            in_flight.insert(key.clone(), rx);
            InFlightGuard::new(key.clone(), Arc::clone(&self.inner.in_flight), tx)
        };

        let result = self.fetch_and_store(key, fetcher, ctx).await;

        guard
            .complete(match &result {
                Ok(entry) => Ok(entry.clone()),
                Err(e) => Err(e.to_string()),
            })
            .await;

        result
    }

    async fn fetch_and_store<F, C>(
        &self,
        key: &K,
        fetcher: &F,
        ctx: &C,
    ) -> Result<Option<CacheEntry<V>>, ShellError>
    where
        F: DataFetcher<K, V, C> + ?Sized,
        C: Send + Sync + ?Sized,
    {
        match fetcher.fetch(ctx, key).await {
            Ok(Some(value)) => {
                debug!("Cache miss - fetched from origin for key: {}", key);
                match self.put(key, &value).await {
                    Ok(entry) => Ok(Some(entry)),
                    Err(e) => {
                        warn!(
                            "L2 write failed for key {} ({}). Continuing without caching.",
                            key, e
                        );
                        Ok(Some(CacheEntry {
                            value: Arc::new(value),
                            tier: Tier::Origin,
                        }))
                    }
                }
            }
            Ok(None) => {
                debug!("Value not found for key: {}", key);
                Ok(None)
            }
            Err(e) => {
                error!("Origin error for key {}: {}", key, e);
                Err(ShellError::Backend(e))
            }
        }
    }

    /// Drop `key` from the volatile tier only, as an eviction would
    pub async fn evict_volatile(&self, key: &K) {
        if let Some(l1) = &self.inner.l1_cache {
            l1.invalidate(key).await;
        }
    }

    /// Invalidate `key` in both tiers
    pub async fn invalidate(&self, key: &K) -> Result<(), ShellError> {
        debug!("Invalidating cache for key: {}", key);
        self.evict_volatile(key).await;

        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn populate_l1(&self, key: &K, value: &Arc<V>) {
        if let Some(l1) = &self.inner.l1_cache {
            l1.insert(key.clone(), Arc::clone(value)).await;
        }
    }

    async fn read_durable(&self, key: &K, path: &Path) -> Option<Arc<V>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Cache miss L2 for key: {}", key);
                return None;
            }
            Err(e) => {
                warn!(
                    "L2 read error for key {} ({}): {}. Falling back to origin.",
                    key,
                    path.display(),
                    e
                );
                return None;
            }
        };

        match serde_json::from_slice::<V>(&bytes) {
            Ok(value) => Some(Arc::new(value)),
            Err(e) => {
                warn!(
                    "Failed to deserialize cached value for key {}: {}. Deleting corrupt entry.",
                    key, e
                );
                if let Err(del_err) = tokio::fs::remove_file(path).await {
                    warn!(
                        "Failed to delete corrupt L2 entry for key {} ({}): {}",
                        key,
                        path.display(),
                        del_err
                    );
                }
                None
            }
        }
    }
}

/// Write through a unique temp file and rename, so concurrent readers never
/// observe a half-written entry.
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension(format!(
        "tmp.{}.{}",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}
