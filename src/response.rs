//! Successful dispatch results, raw and decoded.
//!
//! [`RawResponse`] is what the retry engine produces. [`Response`] wraps a
//! decoded body together with the same metadata, so callers can see which
//! host served them, how long it took and how many hosts were tried.

use crate::{Error, Result};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// A successful exchange, body still undecoded.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// The HTTP status code (always 2xx).
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The response body as text.
    pub body: String,

    /// The host that answered.
    pub host: String,

    /// Hosts tried, including the one that answered.
    pub attempts: usize,

    /// Time from the first attempt to the answer.
    pub latency: Duration,
}

impl RawResponse {
    /// Decodes the body as JSON into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] with the raw body on failure.
    pub fn decode<T: DeserializeOwned>(self) -> Result<Response<T>> {
        match serde_json::from_str::<T>(&self.body) {
            Ok(data) => Ok(Response {
                data,
                raw_body: self.body,
                status: self.status,
                headers: self.headers,
                host: self.host,
                latency: self.latency,
                attempts: self.attempts,
            }),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    raw_response = %self.body,
                    "Failed to deserialize response"
                );

                Err(Error::DeserializationFailed {
                    raw_response: self.body,
                    serde_error: e.to_string(),
                    status: self.status,
                })
            }
        }
    }

    /// Returns the `taskID` of a write acknowledgement, if the body has one.
    ///
    /// ```
    /// # use searchwire::RawResponse;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = RawResponse {
    ///     status: StatusCode::OK,
    ///     headers: HeaderMap::new(),
    ///     body: r#"{"taskID":1234,"objectID":"a"}"#.to_string(),
    ///     host: "APPID.algolia.net".to_string(),
    ///     attempts: 1,
    ///     latency: Duration::from_millis(12),
    /// };
    /// assert_eq!(response.task_id(), Some(1234));
    /// ```
    pub fn task_id(&self) -> Option<u64> {
        let value: serde_json::Value = serde_json::from_str(&self.body).ok()?;
        value.get("taskID")?.as_u64()
    }

    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

/// A successful exchange with its body decoded into `T`.
///
/// ```no_run
/// use searchwire::Client;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Product {
///     name: String,
/// }
///
/// # async fn example() -> Result<(), searchwire::Error> {
/// let client = Client::builder().application_id("APPID").build()?;
/// let response = client.get::<Product>("/1/indexes/products/42").await?;
///
/// println!("{} served by {}", response.data.name, response.host);
/// if response.was_retried() {
///     println!("needed {} hosts", response.attempts);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The decoded body.
    pub data: T,

    /// The body as received.
    pub raw_body: String,

    /// The HTTP status code.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The host that answered.
    pub host: String,

    /// Time from the first attempt to the answer, failovers included.
    pub latency: Duration,

    /// Hosts tried, including the one that answered.
    pub attempts: usize,
}

impl<T> Response<T> {
    /// Maps the decoded data, keeping the metadata.
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            host: self.host,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// Returns `true` if more than one host was tried.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}
