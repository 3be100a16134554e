//! Request and response types seen by the resource cache

use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// Plain-text body of the synthesized offline response
pub const OFFLINE_NOTICE: &str =
    "Offline: this resource is not in the local cache and the network is unreachable.";

/// An intercepted resource request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: Url,
    pub method: Method,
}

impl Request {
    /// Create a GET request
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
        }
    }

    /// Cache key; method and headers are not part of it
    pub fn key(&self) -> &str {
        self.url.as_str()
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }
}

/// How the response relates to the scope origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same origin as the scope
    Basic,
    /// Cross-origin and readable
    Cors,
    /// Cross-origin without a readable grant
    Opaque,
    /// Synthesized locally
    Error,
}

/// Decide the response type for a response to `url` carrying `headers`.
pub fn classify(url: &Url, scope: &Url, headers: &[(String, String)]) -> ResponseType {
    if url.origin() == scope.origin() {
        return ResponseType::Basic;
    }

    let scope_origin = scope.origin().ascii_serialization();
    let granted = headers.iter().any(|(name, value)| {
        name.eq_ignore_ascii_case("access-control-allow-origin")
            && (value.trim() == "*" || value.trim() == scope_origin)
    });

    if granted {
        ResponseType::Cors
    } else {
        ResponseType::Opaque
    }
}

/// A response handed back to the caller of the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub url: Url,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub kind: ResponseType,
    /// Whether the body came from the local store
    pub from_cache: bool,
}

impl Response {
    /// The 503 response served when neither cache nor network can answer
    pub fn offline(url: Url) -> Self {
        Self {
            url,
            status: 503,
            headers: vec![(
                "content-type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )],
            body: OFFLINE_NOTICE.as_bytes().to_vec(),
            kind: ResponseType::Error,
            from_cache: false,
        }
    }

    /// Rebuild a response from a stored record
    pub fn from_record(record: &CachedResponse) -> Self {
        Self {
            url: record.url.clone(),
            status: record.status,
            headers: record.headers.clone(),
            body: record.body.clone(),
            kind: record.kind,
            from_cache: true,
        }
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Only successful same-origin or readable cross-origin responses are stored
    pub fn is_storable(&self) -> bool {
        self.status == 200 && matches!(self.kind, ResponseType::Basic | ResponseType::Cors)
    }
}

/// Byte-exact snapshot of a response as it was stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub url: Url,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(skip)]
    pub body: Vec<u8>,
    pub kind: ResponseType,
    /// Milliseconds since the Unix epoch
    pub stored_at: u64,
}

impl CachedResponse {
    /// Snapshot a live response
    pub fn snapshot(response: &Response) -> Self {
        let stored_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            url: response.url.clone(),
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            kind: response.kind,
            stored_at,
        }
    }
}
