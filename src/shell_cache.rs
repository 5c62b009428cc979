//! Shell cache keyed by target host and locale
//!
//! Two logical entries live under one [`ShellCacheKey`]:
//! - the resolved request URL (volatile tier only, rebuilt from the request
//!   on a miss and recorded only once its body is stored)
//! - the fetched response body, stored together with the URL it came from in
//!   both tiers
//!
//! ## Durable layout
//!
//! One JSON file per key under the cache root: `<host>-<locale>.json`, with
//! an empty locale when locale support is inactive.

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::two_tier_cache::{CacheEntry, DataFetcher, KeyFormatter, TwoTierCache};
use crate::{CacheConfig, ShellError};

/// Cache key: target host and resolved locale
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShellCacheKey {
    pub host: String,
    pub locale: Option<String>,
}

impl ShellCacheKey {
    pub fn new(host: impl Into<String>, locale: Option<&str>) -> Self {
        Self {
            host: host.into(),
            locale: locale.filter(|l| !l.is_empty()).map(str::to_owned),
        }
    }
}

impl fmt::Display for ShellCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.host,
            self.locale.as_deref().unwrap_or("none")
        )
    }
}

/// Cached shell response together with the URL it was fetched from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedShell {
    pub url: String,
    pub body: String,
}

/// Maps keys onto `<host>-<locale>.json`
pub struct ShellKeyFormatter;

impl KeyFormatter<ShellCacheKey> for ShellKeyFormatter {
    fn file_name(&self, key: &ShellCacheKey) -> String {
        format!(
            "{}-{}.json",
            sanitize_file_component(&key.host),
            sanitize_file_component(key.locale.as_deref().unwrap_or(""))
        )
    }
}

/// Keep file names inside the cache root: anything outside
/// `[A-Za-z0-9._-]` becomes `_`, and a leading dot is replaced.
fn sanitize_file_component(s: &str) -> String {
    let mut out: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.starts_with('.') {
        out.replace_range(..1, "_");
    }
    out
}

/// Two-tier shell cache
#[derive(Clone)]
pub struct ShellCache {
    bodies: TwoTierCache<ShellCacheKey, CachedShell, ShellKeyFormatter>,
    urls: Cache<ShellCacheKey, Arc<str>>,
}

impl ShellCache {
    pub fn new(config: CacheConfig) -> Self {
        let urls = Cache::builder()
            .max_capacity(config.l1_max_capacity)
            .build();
        Self {
            bodies: TwoTierCache::new(config, ShellKeyFormatter),
            urls,
        }
    }

    /// Look up the cached response for `key`
    pub async fn get(&self, key: &ShellCacheKey) -> Option<CacheEntry<CachedShell>> {
        let entry = self.bodies.get(key).await?;
        self.remember_url(key, &entry.value.url).await;
        Some(entry)
    }

    /// Store a response in both tiers, durable first
    pub async fn put(
        &self,
        key: &ShellCacheKey,
        value: &CachedShell,
    ) -> Result<CacheEntry<CachedShell>, ShellError> {
        let entry = self.bodies.put(key, value).await?;
        self.remember_url(key, &entry.value.url).await;
        Ok(entry)
    }

    /// Cached response, or fetch through `fetcher` and cache it
    pub async fn get_or_fetch<F, C>(
        &self,
        key: &ShellCacheKey,
        fetcher: &F,
        ctx: &C,
    ) -> Result<Option<CacheEntry<CachedShell>>, ShellError>
    where
        F: DataFetcher<ShellCacheKey, CachedShell, C> + ?Sized,
        C: Send + Sync + ?Sized,
    {
        let entry = self.bodies.get_or_fetch(key, fetcher, ctx).await?;
        if let Some(entry) = &entry {
            self.remember_url(key, &entry.value.url).await;
        }
        Ok(entry)
    }

    /// Request URL for `key`, built with `build` on a miss.
    ///
    /// A built URL is not recorded here; [`ShellCache::put`] records it with
    /// the body, so a failed fetch leaves no URL behind.
    pub async fn request_url(
        &self,
        key: &ShellCacheKey,
        build: impl FnOnce() -> String,
    ) -> Arc<str> {
        match self.urls.get(key).await {
            Some(url) => url,
            None => build().into(),
        }
    }

    /// Drop both entries from the volatile tier, as an eviction would
    pub async fn evict_volatile(&self, key: &ShellCacheKey) {
        self.urls.invalidate(key).await;
        self.bodies.evict_volatile(key).await;
    }

    /// Invalidate the URL and body entries of `key` in both tiers
    pub async fn invalidate(&self, key: &ShellCacheKey) -> Result<(), ShellError> {
        self.urls.invalidate(key).await;
        self.bodies.invalidate(key).await
    }

    /// Durable file backing `key`
    pub fn path_for(&self, key: &ShellCacheKey) -> std::path::PathBuf {
        self.bodies.path_for(key)
    }

    async fn remember_url(&self, key: &ShellCacheKey, url: &str) {
        self.urls.insert(key.clone(), Arc::from(url)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::two_tier_cache::Tier;

    fn shell(url: &str, body: &str) -> CachedShell {
        CachedShell {
            url: url.to_owned(),
            body: body.to_owned(),
        }
    }

    #[test]
    fn test_file_names() {
        let f = ShellKeyFormatter;
        assert_eq!(
            f.file_name(&ShellCacheKey::new("example.com", Some("da"))),
            "example.com-da.json"
        );
        assert_eq!(
            f.file_name(&ShellCacheKey::new("example.com", None)),
            "example.com-.json"
        );
        assert_eq!(
            f.file_name(&ShellCacheKey::new("../etc/passwd", Some(""))),
            "_._etc_passwd-.json"
        );
        assert_eq!(
            f.file_name(&ShellCacheKey::new("localhost:8080", None)),
            "localhost_8080-.json"
        );
    }

    #[test]
    fn test_key_display() {
        assert_eq!(ShellCacheKey::new("a.b", None).to_string(), "a.b:none");
        assert_eq!(ShellCacheKey::new("a.b", Some("sv")).to_string(), "a.b:sv");
    }

    #[tokio::test]
    async fn test_round_trip_and_volatile_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ShellCache::new(CacheConfig::with_cache_dir(dir.path()));
        let key = ShellCacheKey::new("example.com", Some("da"));
        let value = shell("http://example.com/x", r#"{"html":{}}"#);

        cache.put(&key, &value).await.unwrap();
        assert!(dir.path().join("example.com-da.json").exists());
        assert_eq!(*cache.get(&key).await.unwrap().value, value);

        cache.evict_volatile(&key).await;
        let entry = cache.get(&key).await.unwrap();
        assert_eq!(entry.tier, Tier::Durable);
        assert_eq!(*entry.value, value);
    }

    #[tokio::test]
    async fn test_request_url_recorded_only_with_body() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ShellCache::new(CacheConfig::with_cache_dir(dir.path()));
        let key = ShellCacheKey::new("example.com", None);

        let first = cache.request_url(&key, || "http://one".to_owned()).await;
        let second = cache.request_url(&key, || "http://two".to_owned()).await;
        assert_eq!(&*first, "http://one");
        assert_eq!(&*second, "http://two");

        cache.put(&key, &shell("http://one", "{}")).await.unwrap();
        let third = cache.request_url(&key, || "http://two".to_owned()).await;
        assert_eq!(&*third, "http://one");

        cache.invalidate(&key).await.unwrap();
        let fourth = cache.request_url(&key, || "http://two".to_owned()).await;
        assert_eq!(&*fourth, "http://two");
    }

    #[tokio::test]
    async fn test_put_records_url_with_body() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ShellCache::new(CacheConfig::with_cache_dir(dir.path()));
        let key = ShellCacheKey::new("example.com", None);
        cache.put(&key, &shell("http://stored", "{}")).await.unwrap();

        let url = cache.request_url(&key, || "http://rebuilt".to_owned()).await;
        assert_eq!(&*url, "http://stored");
    }

    #[tokio::test]
    async fn test_invalidate_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ShellCache::new(CacheConfig::with_cache_dir(dir.path()));
        let key = ShellCacheKey::new("example.com", None);
        cache.put(&key, &shell("u", "b")).await.unwrap();

        cache.invalidate(&key).await.unwrap();
        assert!(!cache.path_for(&key).exists());
        assert!(cache.get(&key).await.is_none());
    }
}
