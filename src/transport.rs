//! HTTP access to the remote shell API

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use std::time::Duration;
use tracing::debug;

use crate::ShellError;

/// Performs the remote GET for a shell document.
///
/// Implementations must bound the call in time; a timeout is reported as an
/// error like any other failure.
#[async_trait]
pub trait ShellTransport: Send + Sync + 'static {
    /// GET `url` with the given `Authorization` header value and return the body
    async fn get(&self, url: &str, authorization: &str) -> Result<String, ShellError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, ShellError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ShellTransport for HttpTransport {
    async fn get(&self, url: &str, authorization: &str) -> Result<String, ShellError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, authorization)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ShellError::Status {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        Ok(response.text().await?)
    }
}
