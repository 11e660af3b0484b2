//! # Searchwire - resilient request dispatch for hosted search
//!
//! Searchwire turns a logical operation ("read this record", "write this
//! batch") into a successful HTTPS exchange with a hosted, multi-tenant search
//! service, despite individual host failures, network timeouts and the
//! service's read-after-write eventual consistency.
//!
//! ## Quick Start
//!
//! ```no_run
//! use searchwire::{Client, RequestContext, WaitOptions};
//! use http::Method;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), searchwire::Error> {
//!     let client = Client::builder()
//!         .application_id("APPID")
//!         .default_header("X-Algolia-Application-Id", "APPID")?
//!         .default_header("X-Algolia-API-Key", "secret")?
//!         .build()?;
//!
//!     // Writes go to write-capable hosts and are acknowledged with a task id.
//!     let ack = client
//!         .call(
//!             RequestContext::write(Method::PUT, "/1/indexes/products/42")
//!                 .with_body(r#"{"name":"Trail shoes"}"#),
//!         )
//!         .await?;
//!
//!     // Wait until the write is visible before reading it back.
//!     if let Some(task_id) = ack.task_id() {
//!         client
//!             .wait_task("products", task_id, WaitOptions::new().with_timeout(Duration::from_secs(30)))
//!             .await?;
//!     }
//!
//!     let product = client.get::<serde_json::Value>("/1/indexes/products/42").await?;
//!     println!("{} (served by {})", product.data, product.host);
//!     Ok(())
//! }
//! ```
//!
//! ## How a dispatch runs
//!
//! - The [`HostRegistry`] lists the hosts able to serve the call type, lowest
//!   priority first, skipping hosts that failed less than the recovery window
//!   ago.
//! - The [`RetryEngine`] tries them one at a time. Each attempt gets at least
//!   as much time as the previous one ([`TimeoutEscalation`]).
//! - A 2xx ends the dispatch. A 4xx (or a 5xx configured as non-retryable)
//!   ends it too, with [`Error::FatalRequest`]: the answer would be the same on
//!   every host. Network errors, timeouts and other 5xx mark the host down and
//!   move on to the next one.
//! - When every host failed, the caller gets [`Error::ExhaustedHosts`]
//!   carrying the last failure.
//!
//! Dispatches run on a worker pool and return a cancellable
//! [`DispatchHandle`]; await it, or block on it with
//! [`DispatchHandle::wait`].

mod client;
pub mod config;
mod engine;
mod error;
mod handle;
mod host;
mod pool;
pub mod rate_limit;
mod request;
mod response;
pub mod retry;
pub mod task;
pub mod transport;

pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use engine::{EngineSettings, RetryEngine};
pub use error::{BoxError, Error, Result};
pub use handle::DispatchHandle;
pub use host::{
    CallType, Capabilities, Host, HostRef, HostRegistry, HostSnapshot, DEFAULT_RECOVERY_WINDOW,
};
pub use request::{RequestContext, RequestOptions};
pub use response::{RawResponse, Response};
pub use retry::{Outcome, RetryOnRetryable, RetryPredicate, TimeoutEscalation};
pub use task::{TaskStatus, WaitOptions};
pub use tokio_util::sync::CancellationToken;
pub use transport::{HttpReply, HttpRequest, ReqwestTransport, Transport, TransportFailure};
