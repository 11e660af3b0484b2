//! Outcome classification and timeout escalation.
//!
//! Each host attempt ends in exactly one [`Outcome`]. Whether a failure is
//! retried on the next host is decided by a [`RetryPredicate`]; how much time
//! the next attempt gets is decided by a [`TimeoutEscalation`].

use crate::rate_limit::RateLimitInfo;
use crate::transport::{HttpReply, TransportFailure};
use crate::Error;
use http::StatusCode;
use std::time::Duration;

/// Result of one host attempt.
#[derive(Debug)]
pub enum Outcome {
    /// The host answered with a 2xx.
    Success(HttpReply),
    /// The failure is attributable to the host or the network; try the next one.
    RetryableFailure(Error),
    /// The failure would repeat on any host; stop.
    FatalFailure(Error),
}

impl Outcome {
    /// Classifies the result of an attempt against `host`.
    ///
    /// `timeout` is the budget the attempt ran with and `attempt` is 1-indexed.
    pub fn classify(
        result: Result<HttpReply, TransportFailure>,
        host: &str,
        timeout: Duration,
        predicate: &dyn RetryPredicate,
        attempt: usize,
    ) -> Outcome {
        let error = match result {
            Ok(reply) if reply.status.is_success() => return Outcome::Success(reply),
            Ok(reply) => reply_error(reply, host),
            Err(TransportFailure::Timeout) => Error::Timeout {
                host: host.to_string(),
                after: timeout,
            },
            Err(TransportFailure::Network(source)) => Error::Network {
                host: host.to_string(),
                source,
            },
        };

        if predicate.should_retry(&error, attempt) {
            Outcome::RetryableFailure(error)
        } else {
            Outcome::FatalFailure(error.into_fatal())
        }
    }

    /// Returns `true` for [`Outcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

fn reply_error(reply: HttpReply, host: &str) -> Error {
    let HttpReply {
        status,
        headers,
        body,
    } = reply;

    if status.is_client_error() {
        let rate_limit_info = if status == StatusCode::TOO_MANY_REQUESTS {
            Some(RateLimitInfo::from_headers(&headers))
        } else {
            None
        };

        tracing::error!(
            status = status.as_u16(),
            host = %host,
            response = %body,
            "Client error (4xx)"
        );

        Error::FatalRequest {
            status,
            raw_response: body,
            headers,
            rate_limit_info,
            host: host.to_string(),
        }
    } else {
        Error::ServerError {
            status,
            raw_response: body,
            headers,
            host: host.to_string(),
        }
    }
}

/// Decides whether a failed attempt is worth repeating on the next host.
///
/// # Examples
///
/// ```
/// use searchwire::{Error, RetryPredicate};
///
/// /// Never fail over; surface the first error.
/// struct NoFailover;
///
/// impl RetryPredicate for NoFailover {
///     fn should_retry(&self, _error: &Error, _attempt: usize) -> bool {
///         false
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    /// Returns `true` to move on to the next host.
    ///
    /// `attempt` is 1-indexed.
    fn should_retry(&self, error: &Error, attempt: usize) -> bool;
}

/// Retries every error marked retryable, except listed status codes.
///
/// The default policy: network errors, timeouts and 5xx are retried; 4xx
/// are fatal. Statuses in `non_retryable` are fatal too.
#[derive(Debug, Clone, Default)]
pub struct RetryOnRetryable {
    non_retryable: Vec<StatusCode>,
}

impl RetryOnRetryable {
    /// Creates the policy with a list of server statuses to treat as fatal.
    pub fn new(non_retryable: Vec<StatusCode>) -> Self {
        Self { non_retryable }
    }
}

impl RetryPredicate for RetryOnRetryable {
    fn should_retry(&self, error: &Error, _attempt: usize) -> bool {
        if !error.is_retryable() {
            return false;
        }
        match error.status() {
            Some(status) => !self.non_retryable.contains(&status),
            None => true,
        }
    }
}

/// How the per-attempt timeout grows as the engine moves through hosts.
///
/// Attempts are 0-indexed here: attempt 0 always gets the base timeout, and
/// the engine never lets a later attempt get less time than an earlier one.
///
/// ```
/// use searchwire::TimeoutEscalation;
/// use std::time::Duration;
///
/// let base = Duration::from_secs(2);
/// let linear = TimeoutEscalation::Linear;
/// assert_eq!(linear.timeout_for_attempt(base, 0), Duration::from_secs(2));
/// assert_eq!(linear.timeout_for_attempt(base, 2), Duration::from_secs(6));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub enum TimeoutEscalation {
    /// Every attempt gets the base timeout.
    Fixed,

    /// Attempt `i` gets `base * (i + 1)`.
    #[default]
    Linear,

    /// Attempt `i` gets `base * 2^i`, capped at `max`.
    Exponential {
        /// Upper bound for any attempt.
        max: Duration,
    },

    /// Custom escalation from the base timeout and the 0-indexed attempt.
    Custom {
        /// Computes the timeout of an attempt.
        timeout_fn: fn(base: Duration, attempt: usize) -> Duration,
    },
}

impl TimeoutEscalation {
    /// Returns the timeout for the 0-indexed `attempt`.
    pub fn timeout_for_attempt(&self, base: Duration, attempt: usize) -> Duration {
        match self {
            TimeoutEscalation::Fixed => base,
            TimeoutEscalation::Linear => {
                let factor = u32::try_from(attempt.saturating_add(1)).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
            TimeoutEscalation::Exponential { max } => {
                let exponent = u32::try_from(attempt).unwrap_or(u32::MAX);
                let factor = 2u32.saturating_pow(exponent);
                base.saturating_mul(factor).min((*max).max(base))
            }
            TimeoutEscalation::Custom { timeout_fn } => timeout_fn(base, attempt),
        }
    }
}
