//! Network access for the resource cache

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use url::Url;

use super::request::{classify, Request, Response};

const USER_AGENT: &str = concat!("markview/", env!("CARGO_PKG_VERSION"));

/// Network-level failure: no response was received at all
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Network error for {url}: {reason}")]
pub struct FetchError {
    pub url: String,
    pub reason: String,
}

/// Something that can perform a network fetch
pub trait Fetcher: Send + Sync {
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, FetchError>> + Send;
}

/// Fetcher backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    scope: Url,
}

impl HttpFetcher {
    /// Create a fetcher; responses are classified against `scope`'s origin
    pub fn new(scope: Url) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FetchError {
                url: scope.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self { client, scope })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        tracing::debug!("Fetching {} {}", request.method, request.url);

        let to_error = |e: reqwest::Error| FetchError {
            url: request.url.to_string(),
            reason: e.to_string(),
        };

        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await
            .map_err(to_error)?;

        let url = response.url().clone();
        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(to_error)?.to_vec();
        let kind = classify(&url, &self.scope, &headers);

        tracing::trace!("Received {} ({} bytes) from {}", status, body.len(), url);

        Ok(Response {
            url,
            status,
            headers,
            body,
            kind,
            from_cache: false,
        })
    }
}
