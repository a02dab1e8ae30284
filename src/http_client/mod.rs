//! HTTP client for discovery and page fetches.
//!
//! All network access in an ingestion run goes through [`PageFetcher`] so the
//! scheduler can be driven by an in-process fetcher in tests.

mod response;
mod user_agent;

pub use response::{FetchError, FetchResponse};
pub use user_agent::{resolve_user_agent, robots_token, CRAWLER_NAME, USER_AGENT};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{redirect, Client};
use tracing::debug;

/// Maximum redirects followed per request.
pub const MAX_REDIRECTS: usize = 10;

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,text/plain;q=0.8,*/*;q=0.5";

/// Something that can GET a URL and return the buffered body.
///
/// Non-2xx statuses are returned as responses, not errors. Errors are reserved
/// for requests that produced no HTTP status at all.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError>;

    /// User agent presented to servers, used for robots.txt group matching.
    fn user_agent(&self) -> &str {
        USER_AGENT
    }
}

/// reqwest-backed fetcher with a declared crawler identity.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    user_agent: String,
}

impl HttpClient {
    /// Create a client with custom user agent configuration.
    /// - None: declared crawler user agent
    /// - Some(custom): custom user agent string
    pub fn with_user_agent(user_agent_config: Option<&str>) -> Result<Self, FetchError> {
        let user_agent = resolve_user_agent(user_agent_config);
        let client = Client::builder()
            .user_agent(&user_agent)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self { client, user_agent })
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), v.to_string());
            }
        }

        let body = response.text().await?;

        debug!(
            "GET {} -> {} ({} bytes, {}ms)",
            url,
            status,
            body.len(),
            start.elapsed().as_millis()
        );

        Ok(FetchResponse {
            status,
            final_url,
            headers,
            body,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError> {
        // reqwest's per-request timeout covers send; bound the body read too.
        match tokio::time::timeout(timeout, self.get(url, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    }

    fn user_agent(&self) -> &str {
        &self.user_agent
    }
}
