//! Error types for request dispatch and task polling.
//!
//! Every failure a caller can observe is a variant of [`Error`]. Retryable
//! transport failures ([`Error::Network`], [`Error::Timeout`],
//! [`Error::ServerError`]) are absorbed by the retry engine while other
//! candidate hosts remain; callers only see them wrapped inside
//! [`Error::ExhaustedHosts`].

use crate::rate_limit::RateLimitInfo;
use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// Boxed error used for transport-level causes.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for dispatch and task polling.
///
/// # Examples
///
/// ```no_run
/// use searchwire::{CallType, Client, Error, RequestContext};
/// use http::Method;
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder().application_id("APPID").build()?;
/// let context = RequestContext::new(Method::GET, "/1/indexes/products/42")
///     .with_call_type(CallType::Read);
///
/// match client.call(context).await {
///     Ok(response) => println!("{}", response.body),
///     Err(Error::FatalRequest { status, raw_response, .. }) => {
///         eprintln!("rejected with {}: {}", status, raw_response);
///     }
///     Err(Error::ExhaustedHosts { attempts, last_error }) => {
///         eprintln!("{} hosts failed, last: {}", attempts, last_error);
///     }
///     Err(e) => eprintln!("other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The client was misconfigured, or no host is eligible for a call type.
    ///
    /// Raised before any network traffic and never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The service rejected the request in a way that would repeat on any host.
    ///
    /// Covers every 4xx and the 5xx codes configured as non-retryable.
    #[error("HTTP error {status} from {host}: {raw_response}")]
    FatalRequest {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
        /// The response headers
        headers: HeaderMap,
        /// Rate limit information parsed from headers, present on throttled responses
        rate_limit_info: Option<RateLimitInfo>,
        /// The host that answered
        host: String,
    },

    /// A host answered with a retryable server error.
    #[error("Server error {status} from {host}: {raw_response}")]
    ServerError {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
        /// The response headers
        headers: HeaderMap,
        /// The host that answered
        host: String,
    },

    /// A network-level error occurred (connection refused, DNS lookup failed, reset).
    #[error("Network error on {host}: {source}")]
    Network {
        /// The host the attempt targeted
        host: String,
        /// The underlying transport error
        #[source]
        source: BoxError,
    },

    /// A single attempt exceeded its timeout budget.
    #[error("Request to {host} timed out after {after:?}")]
    Timeout {
        /// The host the attempt targeted
        host: String,
        /// The timeout that elapsed
        after: Duration,
    },

    /// Every candidate host failed with a retryable error.
    #[error("All {attempts} candidate hosts failed, last error: {last_error}")]
    ExhaustedHosts {
        /// The number of attempts made, one per candidate host
        attempts: usize,
        /// The last retryable failure observed
        last_error: Box<Error>,
    },

    /// A task did not reach the published state before the caller's deadline.
    ///
    /// Distinct from [`Error::Timeout`], which is a transport timeout of one attempt.
    #[error("Task {task_id} on index {index} not published after {elapsed:?} ({polls} polls)")]
    TaskTimeout {
        /// The index the task belongs to
        index: String,
        /// The task identifier
        task_id: u64,
        /// Wall-clock time spent waiting
        elapsed: Duration,
        /// Status requests issued
        polls: usize,
    },

    /// Waiting for a task was cancelled before it reached the published state.
    #[error("Waiting for task {task_id} on index {index} was cancelled after {polls} polls")]
    TaskCancelled {
        /// The index the task belongs to
        index: String,
        /// The task identifier
        task_id: u64,
        /// Status requests issued
        polls: usize,
    },

    /// The dispatch was cancelled through its handle, or its worker pool shut down.
    #[error("Request was cancelled")]
    Cancelled,

    /// Failed to deserialize the response body into the expected type.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// Failed to serialize the request body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// A host address or path did not form a valid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Returns `true` if this error is worth retrying on another host.
    ///
    /// Network errors, attempt timeouts and server errors are retryable.
    /// Fatal request errors, configuration errors and decode failures are not.
    ///
    /// ```
    /// use searchwire::Error;
    /// use http::{HeaderMap, StatusCode};
    ///
    /// let err = Error::ServerError {
    ///     status: StatusCode::BAD_GATEWAY,
    ///     raw_response: "upstream down".to_string(),
    ///     headers: HeaderMap::new(),
    ///     host: "a.example.com".to_string(),
    /// };
    /// assert!(err.is_retryable());
    ///
    /// let err = Error::FatalRequest {
    ///     status: StatusCode::FORBIDDEN,
    ///     raw_response: "invalid key".to_string(),
    ///     headers: HeaderMap::new(),
    ///     rate_limit_info: None,
    ///     host: "a.example.com".to_string(),
    /// };
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network { .. } | Error::Timeout { .. } | Error::ServerError { .. }
        )
    }

    /// Returns `true` for a failure the service would repeat on any host.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::FatalRequest { .. })
    }

    /// Returns `true` if a task wait ended without the task being published.
    pub fn is_task_timeout(&self) -> bool {
        matches!(self, Error::TaskTimeout { .. } | Error::TaskCancelled { .. })
    }

    /// Returns the HTTP status code if this error has one.
    ///
    /// For [`Error::ExhaustedHosts`] this is the status of the last failure.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::FatalRequest { status, .. }
            | Error::ServerError { status, .. }
            | Error::DeserializationFailed { status, .. } => Some(*status),
            Error::ExhaustedHosts { last_error, .. } => last_error.status(),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::FatalRequest { raw_response, .. }
            | Error::ServerError { raw_response, .. }
            | Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            Error::ExhaustedHosts { last_error, .. } => last_error.raw_response(),
            _ => None,
        }
    }

    /// Returns rate limit information if the service throttled the request.
    pub fn rate_limit_info(&self) -> Option<&RateLimitInfo> {
        match self {
            Error::FatalRequest {
                rate_limit_info, ..
            } => rate_limit_info.as_ref(),
            _ => None,
        }
    }

    /// Converts a retryable server error into a fatal one.
    ///
    /// Used when the retry policy refuses to retry a 5xx. Other variants are
    /// returned unchanged.
    pub(crate) fn into_fatal(self) -> Error {
        match self {
            Error::ServerError {
                status,
                raw_response,
                headers,
                host,
            } => Error::FatalRequest {
                status,
                raw_response,
                headers,
                rate_limit_info: None,
                host,
            },
            other => other,
        }
    }
}

/// A specialized `Result` type for dispatch operations.
pub type Result<T> = std::result::Result<T, Error>;
