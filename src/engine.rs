//! Host failover for one logical operation.
//!
//! The [`RetryEngine`] walks the candidate hosts of a request once, in the
//! order the [`HostRegistry`] gives them, and stops at the first success or
//! fatal failure. Attempts are strictly sequential; each one gets at least as
//! much time as the one before it.

use crate::host::{HostRef, HostRegistry};
use crate::request::RequestContext;
use crate::response::RawResponse;
use crate::retry::{Outcome, RetryPredicate, TimeoutEscalation};
use crate::transport::{HttpRequest, Transport, TransportFailure};
use crate::{CallType, Error, Result};
use http::HeaderMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Settings shared by every dispatch of one client.
#[derive(Clone)]
pub struct EngineSettings {
    /// `https` in production, `http` against local test servers.
    pub scheme: String,
    /// Headers sent with every request.
    pub default_headers: HeaderMap,
    /// Connect budget added to every attempt.
    pub connect_timeout: Duration,
    /// Base read budget for read calls (and calls with no call type).
    pub read_timeout: Duration,
    /// Base read budget for write calls.
    pub write_timeout: Duration,
    /// How the read budget grows across attempts.
    pub escalation: TimeoutEscalation,
    /// Which failures move on to the next host.
    pub predicate: Arc<dyn RetryPredicate>,
}

impl std::fmt::Debug for EngineSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSettings")
            .field("scheme", &self.scheme)
            .field("default_headers", &self.default_headers)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("escalation", &self.escalation)
            .finish_non_exhaustive()
    }
}

/// Per-dispatch progress through the candidate list. Never shared.
struct RetryState {
    candidates: Vec<HostRef>,
    attempt: usize,
    last_timeout: Duration,
    last_error: Option<Error>,
}

impl RetryState {
    fn new(candidates: Vec<HostRef>) -> Self {
        Self {
            candidates,
            attempt: 0,
            last_timeout: Duration::ZERO,
            last_error: None,
        }
    }

    fn exhausted(self) -> Error {
        match self.last_error {
            Some(last_error) => Error::ExhaustedHosts {
                attempts: self.attempt,
                last_error: Box::new(last_error),
            },
            None => Error::Configuration("No hosts available".to_string()),
        }
    }
}

/// Executes requests against the hosts of a [`HostRegistry`].
pub struct RetryEngine {
    registry: Arc<HostRegistry>,
    transport: Arc<dyn Transport>,
    settings: EngineSettings,
}

impl std::fmt::Debug for RetryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryEngine")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RetryEngine {
    /// Creates an engine over `registry`, sending through `transport`.
    pub fn new(
        registry: Arc<HostRegistry>,
        transport: Arc<dyn Transport>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry,
            transport,
            settings,
        }
    }

    /// The registry whose hosts this engine walks.
    pub fn registry(&self) -> &Arc<HostRegistry> {
        &self.registry
    }

    /// Runs `context` to completion.
    ///
    /// Returns the first 2xx answer. A fatal failure is returned at once
    /// without trying further hosts. When every candidate fails with a
    /// retryable error the result is [`Error::ExhaustedHosts`]. Cancelling
    /// `cancel` aborts the in-flight attempt and returns [`Error::Cancelled`].
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if no host is eligible for the call type.
    pub async fn execute(
        &self,
        context: &RequestContext,
        cancel: &CancellationToken,
    ) -> Result<RawResponse> {
        let candidates = match &context.options.host {
            Some(address) => vec![self.registry.resolve(address)],
            None => self.registry.candidate_hosts(context.call_type),
        };

        if candidates.is_empty() {
            let class = context
                .call_type
                .map_or_else(|| "any".to_string(), |ct| ct.to_string());
            return Err(Error::Configuration(format!(
                "No hosts available for {} requests",
                class
            )));
        }

        let start_time = Instant::now();
        let mut state = RetryState::new(candidates);

        while state.attempt < state.candidates.len() {
            let host = state.candidates[state.attempt].clone();
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let timeout = self.attempt_timeout(context, &mut state);
            state.attempt += 1;

            let request = self.build_request(&host, context, timeout)?;

            tracing::debug!(
                method = %context.method,
                url = %request.url,
                host = %host.address(),
                attempt = state.attempt,
                timeout_ms = timeout.as_millis(),
                "Executing HTTP request"
            );

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(host = %host.address(), "Dispatch cancelled mid-attempt");
                    return Err(Error::Cancelled);
                }
                result = tokio::time::timeout(timeout, self.transport.send(request)) => {
                    result.unwrap_or(Err(TransportFailure::Timeout))
                }
            };

            let outcome = Outcome::classify(
                result,
                host.address(),
                timeout,
                self.settings.predicate.as_ref(),
                state.attempt,
            );
            self.registry.report_outcome(&host, &outcome);

            match outcome {
                Outcome::Success(reply) => {
                    let latency = start_time.elapsed();
                    tracing::info!(
                        status = reply.status.as_u16(),
                        host = %host.address(),
                        latency_ms = latency.as_millis(),
                        attempts = state.attempt,
                        "Received HTTP response"
                    );

                    return Ok(RawResponse {
                        status: reply.status,
                        headers: reply.headers,
                        body: reply.body,
                        host: host.address().to_string(),
                        attempts: state.attempt,
                        latency,
                    });
                }
                Outcome::FatalFailure(error) => {
                    tracing::warn!(
                        error = %error,
                        attempt = state.attempt,
                        method = %context.method,
                        path = %context.path,
                        "Request failed with a non-retryable error"
                    );
                    return Err(error);
                }
                Outcome::RetryableFailure(error) => {
                    tracing::warn!(
                        error = %error,
                        attempt = state.attempt,
                        method = %context.method,
                        path = %context.path,
                        "Request failed, trying next host"
                    );
                    state.last_error = Some(error);
                }
            }
        }

        let error = state.exhausted();
        tracing::warn!(
            error = %error,
            method = %context.method,
            path = %context.path,
            "All candidate hosts failed"
        );
        Err(error)
    }

    /// Connect budget plus the escalated (or overridden) read budget.
    ///
    /// This bounds the whole attempt. The TCP connect phase is additionally
    /// capped by the transport's own connect timeout.
    fn attempt_timeout(&self, context: &RequestContext, state: &mut RetryState) -> Duration {
        let connect = context
            .options
            .connect_timeout
            .unwrap_or(self.settings.connect_timeout);

        let read = match context.options.read_timeout {
            Some(read) => read,
            None => {
                let base = match context.call_type {
                    Some(CallType::Write) => self.settings.write_timeout,
                    _ => self.settings.read_timeout,
                };
                self.settings.escalation.timeout_for_attempt(base, state.attempt)
            }
        };

        let timeout = connect.saturating_add(read).max(state.last_timeout);
        state.last_timeout = timeout;
        timeout
    }

    fn build_request(
        &self,
        host: &HostRef,
        context: &RequestContext,
        timeout: Duration,
    ) -> Result<HttpRequest> {
        let mut url = Url::parse(&format!("{}://{}", self.settings.scheme, host.address()))?;
        url.set_path(&context.path);

        if !context.options.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &context.options.query_params {
                pairs.append_pair(key, value);
            }
        }

        let mut headers = self.settings.default_headers.clone();
        for (name, value) in &context.options.headers {
            headers.insert(name.clone(), value.clone());
        }

        Ok(HttpRequest {
            method: context.method.clone(),
            url,
            headers,
            body: context.body.clone(),
            timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Host;
    use crate::retry::RetryOnRetryable;
    use crate::transport::HttpReply;
    use async_trait::async_trait;
    use http::{Method, StatusCode};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Step {
        Reply(u16, &'static str),
        Timeout,
        Refused,
        Hang,
    }

    /// Replays one step per attempt and records what was sent.
    struct ScriptedTransport {
        steps: Mutex<VecDeque<Step>>,
        sent: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<HttpRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            request: HttpRequest,
        ) -> std::result::Result<HttpReply, TransportFailure> {
            self.sent.lock().unwrap().push(request);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Reply(status, body)) => Ok(HttpReply {
                    status: StatusCode::from_u16(status).unwrap(),
                    headers: HeaderMap::new(),
                    body: body.to_string(),
                }),
                Some(Step::Timeout) => Err(TransportFailure::Timeout),
                Some(Step::Refused) => Err(TransportFailure::Network(Box::new(
                    std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
                ))),
                Some(Step::Hang) | None => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            scheme: "https".to_string(),
            default_headers: HeaderMap::new(),
            connect_timeout: Duration::from_millis(10),
            read_timeout: Duration::from_millis(100),
            write_timeout: Duration::from_millis(300),
            escalation: TimeoutEscalation::Linear,
            predicate: Arc::new(RetryOnRetryable::default()),
        }
    }

    fn engine(transport: Arc<ScriptedTransport>) -> RetryEngine {
        let registry = HostRegistry::new(
            vec![
                Host::read("h1", 1),
                Host::read("h2", 2),
                Host::read("h3", 3),
                Host::write("w1", 0),
            ],
            Duration::from_secs(300),
        )
        .unwrap();
        RetryEngine::new(Arc::new(registry), transport, settings())
    }

    fn read_context() -> RequestContext {
        RequestContext::read(Method::GET, "/1/indexes/products/1")
    }

    fn hosts_tried(transport: &ScriptedTransport) -> Vec<String> {
        transport
            .sent()
            .iter()
            .map(|r| r.url.host_str().unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_fails_over_until_success() {
        let transport = ScriptedTransport::new(vec![
            Step::Timeout,
            Step::Reply(500, "oops"),
            Step::Reply(200, r#"{"hits":[]}"#),
        ]);
        let engine = engine(transport.clone());

        let response = engine
            .execute(&read_context(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.body, r#"{"hits":[]}"#);
        assert_eq!(response.attempts, 3);
        assert_eq!(response.host, "h3");
        assert_eq!(hosts_tried(&transport), ["h1", "h2", "h3"]);

        let health: Vec<bool> = engine.registry().hosts().iter().map(|h| h.healthy).collect();
        assert_eq!(health, [false, false, true, true]);
    }

    #[tokio::test]
    async fn test_fatal_stops_after_k_plus_one_attempts() {
        let transport =
            ScriptedTransport::new(vec![Step::Refused, Step::Reply(400, "bad request")]);
        let engine = engine(transport.clone());

        let err = engine
            .execute(&read_context(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert!(err.is_fatal());
        assert_eq!(transport.sent().len(), 2);
        // h2 gave a deterministic answer, so it stays in rotation.
        let h2 = engine.registry().resolve("h2");
        assert!(h2.is_healthy());
    }

    #[tokio::test]
    async fn test_exhausts_every_candidate_once() {
        let transport = ScriptedTransport::new(vec![
            Step::Reply(502, "a"),
            Step::Refused,
            Step::Reply(503, "last"),
        ]);
        let engine = engine(transport.clone());

        let err = engine
            .execute(&read_context(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::ExhaustedHosts {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
                assert_eq!(last_error.raw_response(), Some("last"));
            }
            other => panic!("Expected ExhaustedHosts, got {:?}", other),
        }
        assert_eq!(transport.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_no_candidates_is_configuration_error() {
        let transport = ScriptedTransport::new(vec![Step::Timeout, Step::Timeout, Step::Timeout]);
        let engine = engine(transport.clone());
        let _ = engine
            .execute(&read_context(), &CancellationToken::new())
            .await;

        let err = engine
            .execute(&read_context(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Configuration(msg) if msg.contains("read")));
        assert_eq!(transport.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_timeouts_escalate_per_attempt() {
        let transport = ScriptedTransport::new(vec![
            Step::Timeout,
            Step::Timeout,
            Step::Reply(200, "{}"),
        ]);
        let engine = engine(transport.clone());

        engine
            .execute(&read_context(), &CancellationToken::new())
            .await
            .unwrap();

        let timeouts: Vec<Duration> = transport.sent().iter().map(|r| r.timeout).collect();
        assert_eq!(
            timeouts,
            [
                Duration::from_millis(110),
                Duration::from_millis(210),
                Duration::from_millis(310),
            ]
        );
    }

    #[tokio::test]
    async fn test_write_calls_use_write_hosts_and_budget() {
        let transport = ScriptedTransport::new(vec![Step::Reply(200, r#"{"taskID":9}"#)]);
        let engine = engine(transport.clone());
        let context = RequestContext::write(Method::POST, "/1/indexes/products/batch")
            .with_body(r#"{"requests":[]}"#);

        let response = engine
            .execute(&context, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.task_id(), Some(9));
        let sent = transport.sent();
        assert_eq!(sent[0].url.as_str(), "https://w1/1/indexes/products/batch");
        assert_eq!(sent[0].timeout, Duration::from_millis(310));
        assert_eq!(sent[0].body.as_deref(), Some(r#"{"requests":[]}"#));
    }

    #[tokio::test]
    async fn test_per_call_overrides() {
        let transport = ScriptedTransport::new(vec![Step::Reply(200, "{}")]);
        let engine = engine(transport.clone());
        let context = read_context().with_options(
            crate::RequestOptions::new()
                .with_header("x-algolia-user-id", "user-1")
                .unwrap()
                .with_query_param("attributesToRetrieve", "name")
                .with_read_timeout(Duration::from_millis(40))
                .with_connect_timeout(Duration::from_millis(5))
                .with_host("h2"),
        );

        engine
            .execute(&context, &CancellationToken::new())
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].url.as_str(),
            "https://h2/1/indexes/products/1?attributesToRetrieve=name"
        );
        assert_eq!(sent[0].timeout, Duration::from_millis(45));
        assert_eq!(sent[0].headers.get("x-algolia-user-id").unwrap(), "user-1");
    }

    #[tokio::test]
    async fn test_connect_override_only_shifts_attempt_budget() {
        let transport = ScriptedTransport::new(vec![Step::Timeout, Step::Reply(200, "{}")]);
        let engine = engine(transport.clone());
        let context = read_context().with_options(
            crate::RequestOptions::new().with_connect_timeout(Duration::from_millis(50)),
        );

        engine
            .execute(&context, &CancellationToken::new())
            .await
            .unwrap();

        // Read budgets still escalate; the override replaces the 10ms connect share.
        let timeouts: Vec<Duration> = transport.sent().iter().map(|r| r.timeout).collect();
        assert_eq!(
            timeouts,
            [Duration::from_millis(150), Duration::from_millis(250)]
        );
    }

    #[tokio::test]
    async fn test_attempt_timeout_enforced_by_engine() {
        let transport = ScriptedTransport::new(vec![Step::Hang, Step::Reply(200, "{}")]);
        let engine = engine(transport.clone());

        let response = engine
            .execute(&read_context(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.attempts, 2);
        assert!(!engine.registry().resolve("h1").is_healthy());
    }

    #[tokio::test]
    async fn test_cancellation_stops_further_attempts() {
        let transport = ScriptedTransport::new(vec![Step::Hang]);
        let engine = Arc::new(engine(transport.clone()));
        let cancel = CancellationToken::new();

        let task = {
            let engine = Arc::clone(&engine);
            let cancel = cancel.clone();
            tokio::spawn(async move { engine.execute(&read_context(), &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(transport.sent().len(), 1);
        // The aborted attempt is not held against the host.
        assert!(engine.registry().hosts().iter().all(|h| h.healthy));
    }
}
