//! Single-attempt HTTP exchange.
//!
//! The retry engine never talks to `reqwest` directly; it hands a fully
//! prepared [`HttpRequest`] to a [`Transport`] and gets back either a reply
//! (any status) or a [`TransportFailure`]. Status interpretation happens in
//! the engine.

use crate::error::BoxError;
use crate::{Error, Result};
use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use std::time::Duration;
use url::Url;

/// A request bound to one host, ready to send.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP method.
    pub method: Method,
    /// The absolute URL, host included.
    pub url: Url,
    /// Merged client and per-call headers.
    pub headers: HeaderMap,
    /// Serialized JSON body, if any.
    pub body: Option<String>,
    /// Total budget for this attempt.
    pub timeout: Duration,
}

/// A reply from a host, whatever its status.
#[derive(Debug, Clone)]
pub struct HttpReply {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The response body as text.
    pub body: String,
}

/// Why an attempt produced no reply.
#[derive(Debug)]
pub enum TransportFailure {
    /// The attempt exceeded its timeout.
    Timeout,
    /// Connection, DNS, TLS or body read failure.
    Network(BoxError),
}

/// Sends one request to one host.
///
/// Implementations must be cancel-safe: dropping the returned future aborts
/// the exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs the exchange.
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpReply, TransportFailure>;
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a transport whose connections give up after `connect_timeout`.
    ///
    /// Redirects are returned as-is rather than followed, so a 3xx fails
    /// over to the next host and credentials never leave the host list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the TLS backend fails to initialize.
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                Error::Configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// Wraps an already configured `reqwest::Client`.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpReply, TransportFailure> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .timeout(request.timeout);

        if let Some(body) = request.body {
            builder = builder
                .header(
                    http::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                )
                .body(body);
        }

        let response = builder.send().await.map_err(classify_reqwest)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(classify_reqwest)?;

        Ok(HttpReply {
            status,
            headers,
            body,
        })
    }
}

fn classify_reqwest(error: reqwest::Error) -> TransportFailure {
    if error.is_timeout() {
        TransportFailure::Timeout
    } else {
        TransportFailure::Network(Box::new(error))
    }
}
