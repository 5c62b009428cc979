//! Cache-first retrieval of the shell document
//!
//! [`ShellFetcher::fetch`] never fails: every error (no host, unreachable
//! API, error status, timeout, malformed body) is logged and turned into an
//! absent document. Only bodies that parse are ever written to the cache.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::parser::ShellDocument;
use crate::request::{Credentials, ShellRequest};
use crate::shell_cache::{CachedShell, ShellCache, ShellCacheKey};
use crate::transport::{HttpTransport, ShellTransport};
use crate::two_tier_cache::DataFetcher;
use crate::{CacheConfig, ShellError};

/// Per-call input for a cold fetch
#[derive(Debug, Clone)]
pub struct FetchContext {
    pub request: ShellRequest,
    pub credentials: Credentials,
}

/// Orchestrates cache lookup, remote fetch on miss, and cache population
pub struct ShellFetcher<T: ShellTransport = HttpTransport> {
    cache: ShellCache,
    transport: Arc<T>,
    scheme: String,
}

impl<T: ShellTransport> Clone for ShellFetcher<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            transport: Arc::clone(&self.transport),
            scheme: self.scheme.clone(),
        }
    }
}

impl ShellFetcher<HttpTransport> {
    /// Fetcher over HTTP, bounded by `config.fetch_timeout`
    pub fn http(config: CacheConfig) -> Result<Self, ShellError> {
        let transport = HttpTransport::new(config.fetch_timeout)?;
        Ok(Self::new(config, transport))
    }
}

impl<T: ShellTransport> ShellFetcher<T> {
    pub fn new(config: CacheConfig, transport: T) -> Self {
        Self {
            scheme: config.scheme.clone(),
            cache: ShellCache::new(config),
            transport: Arc::new(transport),
        }
    }

    pub fn cache(&self) -> &ShellCache {
        &self.cache
    }

    /// Fetch the shell document for `request`, cached under its host and
    /// `locale`.
    pub async fn fetch(
        &self,
        request: &ShellRequest,
        credentials: &Credentials,
        locale: Option<&str>,
    ) -> Option<ShellDocument> {
        if request.host.is_empty() {
            warn!("No co-branding domain configured; skipping shell fetch");
            return None;
        }

        let key = ShellCacheKey::new(request.host.as_str(), locale);
        let ctx = FetchContext {
            request: request.clone(),
            credentials: credentials.clone(),
        };

        let entry = match self.cache.get_or_fetch(&key, self, &ctx).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!("Shell fetch failed for {}: {}", key, e);
                return None;
            }
        };
        debug!("Shell for {} served from {:?}", key, entry.tier);

        match ShellDocument::try_parse(&entry.value.body) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!("Cached shell for {} is malformed ({}); invalidating", key, e);
                if let Err(e) = self.cache.invalidate(&key).await {
                    warn!("Failed to invalidate shell cache for {}: {}", key, e);
                }
                None
            }
        }
    }
}

#[async_trait]
impl<T: ShellTransport> DataFetcher<ShellCacheKey, CachedShell, FetchContext> for ShellFetcher<T> {
    async fn fetch(
        &self,
        ctx: &FetchContext,
        key: &ShellCacheKey,
    ) -> Result<Option<CachedShell>, Box<dyn std::error::Error + Send + Sync>> {
        let scheme = self.scheme.as_str();
        let url = self
            .cache
            .request_url(key, || ctx.request.url(scheme))
            .await;
        let body = self
            .transport
            .get(&url, &ctx.credentials.authorization())
            .await?;

        // Reject before caching so a bad response is never served from cache
        ShellDocument::try_parse(&body)?;

        Ok(Some(CachedShell {
            url: url.to_string(),
            body,
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::tests::{serve, serve_silence};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub(crate) const SHELL_JSON: &str = r#"{"html":{"start_tag":"<html>","end_tag":"</html>","head":"<title>shell</title>","body":{"header":"<div class=\"afubar\"><div data-tns-path=\"\"></div></div><header>nav</header>","footer":"<footer>foot</footer>"},"ad":"<div class=\"ad\"></div>"}}"#;

    /// In-memory transport returning a canned result and recording calls
    pub(crate) struct MockTransport {
        pub(crate) response: Result<String, u16>,
        /// Calls answered with 503 before `response` is used
        pub(crate) outages: AtomicUsize,
        pub(crate) calls: AtomicUsize,
        pub(crate) seen: Mutex<Vec<(String, String)>>,
    }

    impl MockTransport {
        pub(crate) fn ok(body: &str) -> Self {
            Self {
                response: Ok(body.to_owned()),
                outages: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn status(status: u16) -> Self {
            Self {
                response: Err(status),
                ..Self::ok("")
            }
        }

        /// 503 for the first call, then `body`
        pub(crate) fn recovering(body: &str) -> Self {
            Self {
                outages: AtomicUsize::new(1),
                ..Self::ok(body)
            }
        }
    }

    #[async_trait]
    impl ShellTransport for Arc<MockTransport> {
        async fn get(&self, url: &str, authorization: &str) -> Result<String, ShellError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((url.to_owned(), authorization.to_owned()));
            let outage = self
                .outages
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if outage {
                return Err(ShellError::Status {
                    status: 503,
                    url: url.to_owned(),
                });
            }
            match &self.response {
                Ok(body) => Ok(body.clone()),
                Err(status) => Err(ShellError::Status {
                    status: *status,
                    url: url.to_owned(),
                }),
            }
        }
    }

    fn request(host: &str) -> ShellRequest {
        ShellRequest {
            host: host.to_owned(),
            partial: true,
            without_ads: false,
            compact_menu: false,
            site_type: None,
        }
    }

    #[tokio::test]
    async fn test_second_fetch_is_cache_hit() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::ok(SHELL_JSON));
        let fetcher = ShellFetcher::new(
            CacheConfig::with_cache_dir(dir.path()),
            Arc::clone(&transport),
        );
        let credentials = Credentials::new("uid", "secret");

        let first = fetcher
            .fetch(&request("example.com"), &credentials, Some("da"))
            .await
            .unwrap();
        let second = fetcher
            .fetch(&request("example.com"), &credentials, Some("da"))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        let seen = transport.seen.lock().unwrap();
        assert_eq!(
            seen[0].0,
            "http://example.com/api/v3/external_headers/?partial=true&without_ads=false"
        );
        assert_eq!(seen[0].1, "Basic dWlkOnNlY3JldA==");
        assert!(dir.path().join("example.com-da.json").exists());
    }

    #[tokio::test]
    async fn test_locales_are_cached_separately() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::ok(SHELL_JSON));
        let fetcher = ShellFetcher::new(
            CacheConfig::with_cache_dir(dir.path()),
            Arc::clone(&transport),
        );
        let credentials = Credentials::default();

        fetcher
            .fetch(&request("example.com"), &credentials, Some("da"))
            .await
            .unwrap();
        fetcher
            .fetch(&request("example.com"), &credentials, Some("sv"))
            .await
            .unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_restart_serves_from_durable_tier() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = Credentials::default();
        let warm = Arc::new(MockTransport::ok(SHELL_JSON));
        ShellFetcher::new(CacheConfig::with_cache_dir(dir.path()), Arc::clone(&warm))
            .fetch(&request("example.com"), &credentials, None)
            .await
            .unwrap();

        let cold = Arc::new(MockTransport::status(500));
        let doc = ShellFetcher::new(CacheConfig::with_cache_dir(dir.path()), Arc::clone(&cold))
            .fetch(&request("example.com"), &credentials, None)
            .await;
        assert!(doc.is_some());
        assert_eq!(cold.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_error_status_is_absent_and_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::status(502));
        let fetcher = ShellFetcher::new(
            CacheConfig::with_cache_dir(dir.path()),
            Arc::clone(&transport),
        );

        let doc = fetcher
            .fetch(&request("example.com"), &Credentials::default(), None)
            .await;
        assert!(doc.is_none());
        assert!(!dir.path().join("example.com-.json").exists());
    }

    #[tokio::test]
    async fn test_failed_fetch_retried_on_next_render() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::recovering(SHELL_JSON));
        let fetcher = ShellFetcher::new(
            CacheConfig::with_cache_dir(dir.path()),
            Arc::clone(&transport),
        );
        let credentials = Credentials::default();

        let first = fetcher
            .fetch(&request("example.com"), &credentials, None)
            .await;
        assert!(first.is_none());
        let second = fetcher
            .fetch(&request("example.com"), &credentials, None)
            .await;
        assert!(second.is_some());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_no_request_url() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::recovering(SHELL_JSON));
        let fetcher = ShellFetcher::new(
            CacheConfig::with_cache_dir(dir.path()),
            Arc::clone(&transport),
        );
        let credentials = Credentials::default();

        assert!(
            fetcher
                .fetch(&request("example.com"), &credentials, None)
                .await
                .is_none()
        );

        let compact = ShellRequest {
            compact_menu: true,
            ..request("example.com")
        };
        assert!(fetcher.fetch(&compact, &credentials, None).await.is_some());

        let expected =
            "http://example.com/api/v3/external_headers/?partial=true&menu_type=compact&without_ads=false";
        assert_eq!(transport.seen.lock().unwrap()[1].0, expected);
        let key = ShellCacheKey::new("example.com", None);
        let cached = fetcher.cache().get(&key).await.unwrap();
        assert_eq!(cached.value.url, expected);
    }

    #[tokio::test]
    async fn test_malformed_body_is_absent_and_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::ok(r#"{"html":{"head":""}}"#));
        let fetcher = ShellFetcher::new(
            CacheConfig::with_cache_dir(dir.path()),
            Arc::clone(&transport),
        );

        let doc = fetcher
            .fetch(&request("example.com"), &Credentials::default(), None)
            .await;
        assert!(doc.is_none());
        assert!(!dir.path().join("example.com-.json").exists());
    }

    #[tokio::test]
    async fn test_empty_host_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::ok(SHELL_JSON));
        let fetcher = ShellFetcher::new(
            CacheConfig::with_cache_dir(dir.path()),
            Arc::clone(&transport),
        );

        assert!(
            fetcher
                .fetch(&request(""), &Credentials::default(), None)
                .await
                .is_none()
        );
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, seen) = serve(200, SHELL_JSON).await;
        let fetcher = ShellFetcher::http(CacheConfig::with_cache_dir(dir.path())).unwrap();

        let doc = fetcher
            .fetch(&request(&addr), &Credentials::new("a", "b"), None)
            .await
            .unwrap();
        assert_eq!(doc.header.body, "<header>nav</header>");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve_silence().await;
        let config = CacheConfig {
            fetch_timeout: Duration::from_millis(200),
            ..CacheConfig::with_cache_dir(dir.path())
        };
        let fetcher = ShellFetcher::http(config).unwrap();

        let doc = fetcher
            .fetch(&request(&addr), &Credentials::default(), None)
            .await;
        assert!(doc.is_none());
    }
}
