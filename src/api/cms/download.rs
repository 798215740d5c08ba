use std::{future::Future, time::Duration};

use async_trait::async_trait;
use log::warn;
use reqwest::{
    header::{ACCEPT, USER_AGENT},
    Client, StatusCode,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("download failed with HTTP {0}")]
    Status(StatusCode),
}

impl FetchError {
    /// Failures worth another attempt: the server may answer next time.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Request(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            FetchError::Status(status) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Wait before the first retry, doubled for every retry after that.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(2_u32.saturating_pow(retry))
    }
}

/// Call `op` until it succeeds, fails with a permanent error, or the retries
/// of `policy` are used up.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut retry = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && retry < policy.max_retries => {
                let wait = policy.delay(retry);
                retry += 1;
                warn!(
                    "{} failed: {} (attempt {}/{}), retrying in {:?}",
                    what,
                    e,
                    retry,
                    policy.max_retries + 1,
                    wait
                );
                tokio::time::sleep(wait).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Anything that can get the content of a dataset from its download URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
    pub retry: RetryPolicy,
}

impl HttpFetcher {
    /// The `timeout` applies to each attempt separately.
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpFetcher { client, retry })
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, concat!("cms_hospitals/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "text/csv,*/*")
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(FetchError::Status(response.status()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        with_retry(self.retry, url, || self.fetch_once(url)).await
    }
}
