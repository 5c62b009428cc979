//! Per-request pipeline: configuration to injectable shell context

use tracing::debug;

use crate::fetcher::ShellFetcher;
use crate::injector::{DisplayPolicy, ShellContext};
use crate::request::{Credentials, ShellRequest};
use crate::tenant_config::{ConfigResolver, Localization, TenantConfig};
use crate::transport::{HttpTransport, ShellTransport};
use crate::{CacheConfig, ShellError};

/// Long-lived entry point shared by all page renders.
///
/// Each render calls [`ShellPipeline::load`] once and passes the returned
/// [`ShellContext`] to both injection points.
pub struct ShellPipeline<T: ShellTransport = HttpTransport> {
    fetcher: ShellFetcher<T>,
}

impl<T: ShellTransport> Clone for ShellPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
        }
    }
}

impl ShellPipeline<HttpTransport> {
    pub fn http(config: CacheConfig) -> Result<Self, ShellError> {
        Ok(Self::new(ShellFetcher::http(config)?))
    }
}

impl<T: ShellTransport> ShellPipeline<T> {
    pub fn new(fetcher: ShellFetcher<T>) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &ShellFetcher<T> {
        &self.fetcher
    }

    /// Build the shell context for one page render
    pub async fn load(
        &self,
        config: TenantConfig,
        localization: &dyn Localization,
    ) -> ShellContext {
        let resolver = ConfigResolver::new(config, localization);
        self.load_resolved(&resolver).await
    }

    /// Build the shell context from an already resolved configuration
    pub async fn load_resolved(&self, resolver: &ConfigResolver) -> ShellContext {
        let request = ShellRequest::build(resolver);
        let credentials = Credentials::from_resolver(resolver);
        let policy = DisplayPolicy::from_resolver(resolver);

        let document = self
            .fetcher
            .fetch(&request, &credentials, resolver.locale())
            .await;
        if document.is_none() {
            debug!("No shell for host '{}'; rendering without it", request.host);
        }

        ShellContext::new(document, policy)
    }
}
