//! shell-splice - Shared site shell retrieval and splicing
//!
//! This library fetches a centrally hosted site shell (head markup, header,
//! footer, ads) from a tenant's shell API and splices it into host pages:
//! - Tenant options are resolved with per-locale overrides
//! - Responses are cached in two tiers: in-memory Moka (volatile) and one
//!   JSON file per host and locale (durable)
//! - The response is parsed into fragments, fail-closed
//! - Fragments are emitted at two page lifecycle points under the tenant's
//!   display policy
//!
//! Every failure degrades to "no shell": the host page always renders.

mod config;
mod error;
pub mod fetcher;
pub mod injector;
pub mod parser;
pub mod pipeline;
pub mod request;
pub mod shell_cache;
pub mod tenant_config;
pub mod transport;
mod two_tier_cache;

pub use config::CacheConfig;
pub use error::ShellError;
pub use fetcher::{FetchContext, ShellFetcher};
pub use injector::{DisplayPolicy, NoHooks, SHELL_NAMESPACE, ShellContext, ShellHooks};
pub use parser::{HeaderFragment, ShellDocument};
pub use pipeline::ShellPipeline;
pub use request::{Credentials, ShellRequest};
pub use shell_cache::{CachedShell, ShellCache, ShellCacheKey};
pub use tenant_config::{ConfigResolver, FixedLocale, Localization, NoLocalization, TenantConfig};
pub use transport::{HttpTransport, ShellTransport};
pub use two_tier_cache::{
    CacheEntry, CacheKey, Cacheable, DataFetcher, KeyFormatter, Tier, TwoTierCache,
};

// Re-export async_trait for convenience
pub use async_trait::async_trait;
