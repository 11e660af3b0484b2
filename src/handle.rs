//! Completion handles for dispatched operations.
//!
//! Every dispatch runs on the client's worker pool and reports back through
//! a [`DispatchHandle`]. The handle is a future, so async callers simply
//! `.await` it; synchronous callers use [`DispatchHandle::wait`].

use crate::{Error, Result};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// A pending operation.
///
/// Dropping the handle does not stop the operation; call
/// [`cancel`](Self::cancel) for that.
///
/// ```no_run
/// use searchwire::{Client, RequestContext};
/// use http::Method;
///
/// # async fn example() -> Result<(), searchwire::Error> {
/// let client = Client::builder().application_id("APPID").build()?;
/// let handle = client.dispatch(RequestContext::read(Method::GET, "/1/indexes"));
///
/// // Give up if something else finishes first.
/// let token = handle.cancellation_token();
/// tokio::spawn(async move {
///     tokio::time::sleep(std::time::Duration::from_secs(1)).await;
///     token.cancel();
/// });
///
/// match handle.await {
///     Ok(response) => println!("{}", response.body),
///     Err(searchwire::Error::Cancelled) => println!("gave up"),
///     Err(e) => return Err(e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
#[must_use = "a dispatch handle does nothing unless awaited, waited on or cancelled"]
pub struct DispatchHandle<T> {
    receiver: oneshot::Receiver<Result<T>>,
    cancel: CancellationToken,
}

impl<T> DispatchHandle<T> {
    pub(crate) fn new(receiver: oneshot::Receiver<Result<T>>, cancel: CancellationToken) -> Self {
        Self { receiver, cancel }
    }

    /// Stops further attempts and aborts the in-flight one.
    ///
    /// The handle then resolves to [`Error::Cancelled`] (or
    /// [`Error::TaskCancelled`] for task waits), unless the operation had
    /// already completed. Side effects already applied by the service are
    /// not rolled back.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A token that cancels this operation from elsewhere.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Blocks the current thread until the operation completes.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context; await
    /// the handle there instead.
    pub fn wait(self) -> Result<T> {
        self.receiver
            .blocking_recv()
            .unwrap_or_else(|_| Err(Error::Cancelled))
    }
}

impl<T> Future for DispatchHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the worker pool went away mid-flight.
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(Error::Cancelled)))
    }
}
