//! HTTP Fetch Boundary
//!
//! The `Fetcher` trait abstracts the outbound HTTP call so any conforming
//! client can sit behind the request cache; `ReqwestFetcher` is the default
//! implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::{CacheError, Result};

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

// == Fetch Request ==
/// An outbound request in fetch-call shape.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    /// HTTP method
    pub method: String,
    /// Request URL
    pub url: String,
    /// Header pairs, in caller order
    pub headers: Vec<(String, String)>,
    /// Optional request body
    pub body: Option<String>,
}

impl FetchRequest {
    /// Creates a request with the given method and URL.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Creates a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Adds a header pair.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

// == Fetch Response ==
/// A completed response in fetch-call shape.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,
    /// HTTP status reason phrase
    pub status_text: String,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Response body, parsed as JSON where possible
    pub data: Value,
}

// == Fetcher ==
/// The outbound network boundary.
///
/// A fetcher returns `Ok` for any completed HTTP exchange regardless of
/// status code; `Err` means the exchange itself failed (connection refused,
/// timeout, DNS). The owning strategy decides what a failure means.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs the HTTP exchange.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

// == Reqwest Fetcher ==
/// Default fetcher backed by reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    /// Creates a fetcher with the default timeout.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an existing client, sharing its connection pool.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|e| CacheError::Network(format!("invalid method {}: {}", request.method, e)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = builder.send().await?;

        let status = response.status().as_u16();
        let status_text = response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        // Non-JSON bodies are carried as plain strings rather than rejected
        let text = response.text().await?;
        let data = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(FetchResponse {
            status,
            status_text,
            headers,
            data,
        })
    }
}
