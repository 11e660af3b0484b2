//! The client: configuration, dispatch and task waits.
//!
//! The [`Client`] type is the entry point for every operation. Use
//! [`ClientBuilder`] to configure and create clients.

use crate::{
    config::ClientConfig,
    engine::{EngineSettings, RetryEngine},
    handle::DispatchHandle,
    host::{Host, HostRegistry},
    pool::WorkerPool,
    request::RequestContext,
    response::RawResponse,
    retry::{RetryOnRetryable, RetryPredicate, TimeoutEscalation},
    task::{self, WaitOptions},
    transport::{ReqwestTransport, Transport},
    Error, Response, Result,
};
use http::{HeaderName, HeaderValue, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// A client for a hosted search application.
///
/// Cheap to clone; clones share the host registry, the connection pool and
/// the worker pool.
///
/// # Host outages
///
/// A host that fails with a network error, a timeout or a retryable server
/// status stays out of rotation for the recovery window (five minutes by
/// default). If every host of a call type is out, dispatches of that type
/// fail at once with [`Error::Configuration`] until the window passes, even
/// when the outage itself was brief. Call
/// [`registry().reset()`](HostRegistry::reset) to put every host back
/// immediately, or shorten the window with
/// [`ClientBuilder::health_recovery_window`].
///
/// # Examples
///
/// ```no_run
/// use searchwire::{Client, RequestContext, WaitOptions};
/// use http::Method;
/// use serde::Deserialize;
/// use std::time::Duration;
///
/// #[derive(Deserialize)]
/// struct SearchResult {
///     hits: Vec<serde_json::Value>,
/// }
///
/// # async fn example() -> Result<(), searchwire::Error> {
/// let client = Client::builder()
///     .application_id("APPID")
///     .default_header("X-Algolia-Application-Id", "APPID")?
///     .default_header("X-Algolia-API-Key", "secret")?
///     .build()?;
///
/// // Write, then wait until the write is visible before reading.
/// let ack = client
///     .call(
///         RequestContext::write(Method::POST, "/1/indexes/products/batch")
///             .with_body(r#"{"requests":[]}"#),
///     )
///     .await?;
/// if let Some(task_id) = ack.task_id() {
///     client
///         .wait_task("products", task_id, WaitOptions::new().with_timeout(Duration::from_secs(30)))
///         .await?;
/// }
///
/// let found = client
///     .execute::<SearchResult>(
///         RequestContext::read(Method::POST, "/1/indexes/products/query")
///             .with_body(r#"{"query":"shoes"}"#),
///     )
///     .await?;
/// println!("{} hits after {} attempts", found.hits.len(), found.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    engine: Arc<RetryEngine>,
    pool: WorkerPool,
    task_poll_interval: Duration,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The host registry shared by every dispatch of this client.
    pub fn registry(&self) -> &HostRegistry {
        self.inner.engine.registry()
    }

    /// Starts an operation on the worker pool and returns its handle.
    ///
    /// The handle resolves to the first successful response, a fatal error,
    /// or [`Error::ExhaustedHosts`]. It can be cancelled at any time.
    pub fn dispatch(&self, context: RequestContext) -> DispatchHandle<RawResponse> {
        let engine = Arc::clone(&self.inner.engine);
        self.spawn(CancellationToken::new(), move |cancel| async move {
            engine.execute(&context, &cancel).await
        })
    }

    /// Dispatches and awaits the result.
    pub async fn call(&self, context: RequestContext) -> Result<RawResponse> {
        self.dispatch(context).await
    }

    /// Dispatches and blocks the current thread until the result is in.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn call_blocking(&self, context: RequestContext) -> Result<RawResponse> {
        self.dispatch(context).wait()
    }

    /// Dispatches and decodes the JSON body into `Res`.
    pub async fn execute<Res>(&self, context: RequestContext) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.call(context).await?.decode()
    }

    /// Makes a GET request against read hosts.
    ///
    /// ```no_run
    /// # async fn example() -> Result<(), searchwire::Error> {
    /// let client = searchwire::Client::builder().application_id("APPID").build()?;
    /// let settings = client.get::<serde_json::Value>("/1/indexes/products/settings").await?;
    /// println!("{}", settings.data);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get<Res>(&self, path: impl Into<String>) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.execute(RequestContext::read(Method::GET, path)).await
    }

    /// Makes a POST request with a JSON body against write hosts.
    ///
    /// Read-only POSTs such as queries should go through
    /// [`execute`](Self::execute) with [`RequestContext::read`].
    pub async fn post<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let context = RequestContext::write(Method::POST, path).with_json(body)?;
        self.execute(context).await
    }

    /// Makes a PUT request with a JSON body against write hosts.
    pub async fn put<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let context = RequestContext::write(Method::PUT, path).with_json(body)?;
        self.execute(context).await
    }

    /// Makes a DELETE request against write hosts.
    pub async fn delete<Res>(&self, path: impl Into<String>) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.execute(RequestContext::write(Method::DELETE, path)).await
    }

    /// Waits until `task_id` on `index` is published.
    ///
    /// Resolves to `Ok(())` as soon as a poll reports the task done. With a
    /// timeout set, resolves to [`Error::TaskTimeout`] no later than the
    /// timeout; cancelling the handle (or the token in `options`) resolves it
    /// to [`Error::TaskCancelled`].
    pub fn wait_task(
        &self,
        index: impl Into<String>,
        task_id: u64,
        options: WaitOptions,
    ) -> DispatchHandle<()> {
        let engine = Arc::clone(&self.inner.engine);
        let index = index.into();
        let interval = options.poll_interval.unwrap_or(self.inner.task_poll_interval);
        let cancel = match &options.cancel {
            Some(external) => external.child_token(),
            None => CancellationToken::new(),
        };

        self.spawn(cancel, move |cancel| async move {
            task::wait_for_task(
                &engine,
                &index,
                task_id,
                interval,
                options.timeout,
                options.request_options,
                cancel,
            )
            .await
        })
    }

    /// Waits for a task, blocking the current thread.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn wait_task_blocking(
        &self,
        index: impl Into<String>,
        task_id: u64,
        options: WaitOptions,
    ) -> Result<()> {
        self.wait_task(index, task_id, options).wait()
    }

    fn spawn<T, F, Fut>(&self, cancel: CancellationToken, operation: F) -> DispatchHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let future = operation(cancel.clone());

        self.inner.pool.spawn(async move {
            // The caller may have dropped the handle; nobody to tell.
            let _ = sender.send(future.await);
        });

        DispatchHandle::new(receiver, cancel)
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use searchwire::{ClientBuilder, Host, TimeoutEscalation};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), searchwire::Error> {
/// let client = ClientBuilder::new()
///     .hosts(vec![
///         Host::read("search-1.internal", 0),
///         Host::write("index-1.internal", 0),
///         Host::read_write("fallback.internal", 1),
///     ])
///     .read_timeout(Duration::from_secs(2))
///     .timeout_escalation(TimeoutEscalation::Exponential { max: Duration::from_secs(10) })
///     .health_recovery_window(Duration::from_secs(60))
///     .worker_threads(8)
///     .default_header("User-Agent", "my-app/1.0")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    config: ClientConfig,
    retry_predicate: Option<Arc<dyn RetryPredicate>>,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            retry_predicate: None,
            transport: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the application whose default hosts are used.
    pub fn application_id(mut self, application_id: impl Into<String>) -> Self {
        self.config.application_id = Some(application_id.into());
        self
    }

    /// Overrides the host list.
    pub fn hosts(mut self, hosts: Vec<Host>) -> Self {
        self.config.hosts = hosts;
        self
    }

    /// Sets the read hosts, in priority order.
    pub fn read_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.read_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the write hosts, in priority order.
    pub fn write_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.write_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the URL scheme, `https` by default.
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.config.scheme = scheme.into();
        self
    }

    /// Sets the connect budget per attempt.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the base read budget for read calls.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Sets the base read budget for write calls.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Sets how the read budget grows across attempts.
    pub fn timeout_escalation(mut self, escalation: TimeoutEscalation) -> Self {
        self.config.timeout_escalation = escalation;
        self
    }

    /// Sets how long a failed host stays out of rotation.
    pub fn health_recovery_window(mut self, window: Duration) -> Self {
        self.config.health_recovery_window = window;
        self
    }

    /// Runs dispatches on an owned pool of `threads` workers.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = Some(threads);
        self
    }

    /// Sets the default delay between task status polls.
    pub fn task_poll_interval(mut self, interval: Duration) -> Self {
        self.config.task_poll_interval = interval;
        self
    }

    /// Treats a server status as fatal instead of failing over.
    pub fn non_retryable_status(mut self, status: StatusCode) -> Self {
        self.config.non_retryable_statuses.push(status);
        self
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.config.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets a custom retry predicate.
    ///
    /// Replaces the default policy, including any statuses registered with
    /// [`non_retryable_status`](Self::non_retryable_status).
    pub fn retry_predicate(mut self, predicate: Arc<dyn RetryPredicate>) -> Self {
        self.retry_predicate = Some(predicate);
        self
    }

    /// Sends through a custom transport instead of `reqwest`.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no hosts can be resolved, a
    /// capability class has no host, a budget is zero, or the worker pool
    /// cannot start.
    pub fn build(self) -> Result<Client> {
        let config = self.config;
        config.validate()?;

        let registry = HostRegistry::new(config.resolve_hosts()?, config.health_recovery_window)?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(config.connect_timeout)?),
        };

        let predicate = self.retry_predicate.unwrap_or_else(|| {
            Arc::new(RetryOnRetryable::new(config.non_retryable_statuses.clone()))
        });

        let settings = EngineSettings {
            scheme: config.scheme,
            default_headers: config.default_headers,
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            escalation: config.timeout_escalation,
            predicate,
        };

        let pool = WorkerPool::new(config.worker_threads)?;

        tracing::debug!(
            hosts = registry.hosts().len(),
            recovery_window_secs = registry.recovery_window().as_secs(),
            owned_pool = pool.is_owned(),
            "Client built"
        );

        Ok(Client {
            inner: Arc::new(ClientInner {
                engine: Arc::new(RetryEngine::new(Arc::new(registry), transport, settings)),
                pool,
                task_poll_interval: config.task_poll_interval,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
