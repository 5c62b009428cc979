//! Cache and fetch configuration

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the two-tier shell cache and the remote fetch
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the volatile (L1) tier; `0` disables it
    pub l1_max_capacity: u64,
    /// Root directory of the durable (file) tier
    pub cache_dir: PathBuf,
    /// Upper bound for a single remote GET
    pub fetch_timeout: Duration,
    /// Share one network call between concurrent cold fetches of the same key
    pub coalesce_fetches: bool,
    /// Scheme used for the remote shell API
    pub scheme: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_max_capacity: 1000,
            cache_dir: std::env::temp_dir().join("shell-splice"),
            fetch_timeout: Duration::from_secs(5),
            coalesce_fetches: true,
            scheme: "http".to_owned(),
        }
    }
}

impl CacheConfig {
    /// Default configuration rooted at the given durable cache directory
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }
}
