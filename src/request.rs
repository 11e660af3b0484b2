//! Description of one logical operation.

use crate::host::CallType;
use crate::{Error, Result};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::time::Duration;

/// Everything the retry engine needs to run one operation.
///
/// The path is relative to whichever host serves the attempt. A `call_type`
/// of `None` makes every registered host eligible.
///
/// ```
/// use searchwire::{CallType, RequestContext, RequestOptions};
/// use http::Method;
/// use std::time::Duration;
///
/// let context = RequestContext::new(Method::POST, "/1/indexes/products/query")
///     .with_call_type(CallType::Read)
///     .with_body(r#"{"query":"shoes"}"#)
///     .with_options(RequestOptions::new().with_read_timeout(Duration::from_secs(1)));
/// assert_eq!(context.call_type, Some(CallType::Read));
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The HTTP method.
    pub method: Method,

    /// The request path, starting with `/`.
    pub path: String,

    /// Serialized JSON body.
    pub body: Option<String>,

    /// Which hosts may serve this operation.
    pub call_type: Option<CallType>,

    /// Per-call overrides.
    pub options: RequestOptions,
}

impl RequestContext {
    /// Creates a context with no body, no call type and default options.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            call_type: None,
            options: RequestOptions::default(),
        }
    }

    /// Shorthand for a context restricted to read hosts.
    pub fn read(method: Method, path: impl Into<String>) -> Self {
        Self::new(method, path).with_call_type(CallType::Read)
    }

    /// Shorthand for a context restricted to write hosts.
    pub fn write(method: Method, path: impl Into<String>) -> Self {
        Self::new(method, path).with_call_type(CallType::Write)
    }

    /// Sets the call type.
    pub fn with_call_type(mut self, call_type: CallType) -> Self {
        self.call_type = Some(call_type);
        self
    }

    /// Sets an already serialized body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `body` to JSON and sets it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializationFailed`] if serialization fails.
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let json =
            serde_json::to_string(body).map_err(|e| Error::SerializationFailed(e.to_string()))?;
        self.body = Some(json);
        Ok(self)
    }

    /// Replaces the per-call options.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Headers added on top of the client defaults, replacing same-named ones.
    pub headers: HeaderMap,

    /// Query parameters, in order.
    pub query_params: Vec<(String, String)>,

    /// Replaces the escalated read budget of every attempt.
    pub read_timeout: Option<Duration>,

    /// Replaces the connect share of every attempt's total budget.
    ///
    /// The TCP connect itself stays bounded by the client-level connect
    /// timeout, so a value above it only lengthens the attempt budget.
    pub connect_timeout: Option<Duration>,

    /// Sends to this host only, bypassing capability-based selection.
    pub host: Option<String>,
}

impl RequestOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Adds a query parameter.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    /// Overrides the read budget of every attempt.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Overrides the connect share of every attempt's total budget.
    ///
    /// See [`RequestOptions::connect_timeout`] for how this interacts with
    /// the client-level connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Pins the request to one host.
    pub fn with_host(mut self, address: impl Into<String>) -> Self {
        self.host = Some(address.into());
        self
    }
}
