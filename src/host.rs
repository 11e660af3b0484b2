//! Candidate hosts and their health state.
//!
//! A [`HostRegistry`] is owned by one client. It hands out the hosts eligible
//! for a [`CallType`] in priority order and records the outcome of each
//! attempt. Health is tracked per host behind its own lock, so dispatches
//! touching different hosts never contend.
//!
//! A host that fails with a retryable error is marked down and skipped until
//! the recovery window has elapsed. Recovery is evaluated lazily when hosts
//! are selected; there is no background timer.

use crate::retry::Outcome;
use crate::{Error, Result};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default time a failed host stays out of rotation.
pub const DEFAULT_RECOVERY_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Classification of an operation, used to pick eligible hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallType {
    /// Searches and record reads.
    Read,
    /// Indexing and settings writes.
    Write,
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallType::Read => f.write_str("read"),
            CallType::Write => f.write_str("write"),
        }
    }
}

/// The set of call types a host can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    read: bool,
    write: bool,
}

impl Capabilities {
    /// Serves reads only.
    pub const READ: Capabilities = Capabilities {
        read: true,
        write: false,
    };
    /// Serves writes only.
    pub const WRITE: Capabilities = Capabilities {
        read: false,
        write: true,
    };
    /// Serves both reads and writes.
    pub const READ_WRITE: Capabilities = Capabilities {
        read: true,
        write: true,
    };

    /// Returns `true` if hosts with these capabilities serve `call_type`.
    pub fn contains(self, call_type: CallType) -> bool {
        match call_type {
            CallType::Read => self.read,
            CallType::Write => self.write,
        }
    }

    /// Returns `true` if no call type is served.
    pub fn is_empty(self) -> bool {
        !self.read && !self.write
    }

    /// Returns the union of both sets.
    pub fn union(self, other: Capabilities) -> Capabilities {
        Capabilities {
            read: self.read || other.read,
            write: self.write || other.write,
        }
    }
}

impl From<CallType> for Capabilities {
    fn from(call_type: CallType) -> Self {
        match call_type {
            CallType::Read => Capabilities::READ,
            CallType::Write => Capabilities::WRITE,
        }
    }
}

/// Static description of one network endpoint.
///
/// Lower `priority` is tried first; ties keep registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    address: String,
    capabilities: Capabilities,
    priority: u32,
}

impl Host {
    /// Creates a host description.
    pub fn new(address: impl Into<String>, capabilities: Capabilities, priority: u32) -> Self {
        Self {
            address: address.into(),
            capabilities,
            priority,
        }
    }

    /// A host serving reads only.
    pub fn read(address: impl Into<String>, priority: u32) -> Self {
        Self::new(address, Capabilities::READ, priority)
    }

    /// A host serving writes only.
    pub fn write(address: impl Into<String>, priority: u32) -> Self {
        Self::new(address, Capabilities::WRITE, priority)
    }

    /// A host serving both reads and writes.
    pub fn read_write(address: impl Into<String>, priority: u32) -> Self {
        Self::new(address, Capabilities::READ_WRITE, priority)
    }

    /// The hostname, optionally with a port.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The call types this host serves.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Rank within its capability class, lower first.
    pub fn priority(&self) -> u32 {
        self.priority
    }
}

#[derive(Debug, Clone, Copy)]
struct Health {
    healthy: bool,
    last_state_change: Option<Instant>,
}

#[derive(Debug)]
struct HostEntry {
    host: Host,
    health: Mutex<Health>,
}

impl HostEntry {
    fn new(host: Host) -> Self {
        Self {
            host,
            health: Mutex::new(Health {
                healthy: true,
                last_state_change: None,
            }),
        }
    }

    // A poisoned lock only means another thread panicked between two field
    // writes of plain data; the value is still usable.
    fn lock(&self) -> MutexGuard<'_, Health> {
        self.health.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared reference to a host tracked by a [`HostRegistry`].
///
/// Cheap to clone; outcomes reported against it update the registry's view.
#[derive(Debug, Clone)]
pub struct HostRef(Arc<HostEntry>);

impl HostRef {
    fn detached(host: Host) -> Self {
        HostRef(Arc::new(HostEntry::new(host)))
    }

    /// The hostname, optionally with a port.
    pub fn address(&self) -> &str {
        self.0.host.address()
    }

    /// The call types this host serves.
    pub fn capabilities(&self) -> Capabilities {
        self.0.host.capabilities()
    }

    /// Rank within its capability class.
    pub fn priority(&self) -> u32 {
        self.0.host.priority()
    }

    /// The current health flag, without applying lazy recovery.
    pub fn is_healthy(&self) -> bool {
        self.0.lock().healthy
    }
}

/// Point-in-time view of one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSnapshot {
    /// The hostname, optionally with a port.
    pub address: String,
    /// The call types this host serves.
    pub capabilities: Capabilities,
    /// Rank within its capability class.
    pub priority: u32,
    /// Whether the host is currently in rotation.
    pub healthy: bool,
    /// When the host was last marked down, if it is down.
    pub last_state_change: Option<Instant>,
}

/// Ordered, health-aware set of candidate hosts.
///
/// # Examples
///
/// ```
/// use searchwire::{CallType, Host, HostRegistry};
/// use std::time::Duration;
///
/// let registry = HostRegistry::new(
///     vec![
///         Host::read("APPID-dsn.algolia.net", 0),
///         Host::write("APPID.algolia.net", 0),
///         Host::read_write("APPID-1.algolianet.com", 1),
///     ],
///     Duration::from_secs(300),
/// )?;
///
/// let reads: Vec<_> = registry
///     .candidate_hosts(Some(CallType::Read))
///     .iter()
///     .map(|h| h.address().to_string())
///     .collect();
/// assert_eq!(reads, ["APPID-dsn.algolia.net", "APPID-1.algolianet.com"]);
/// # Ok::<(), searchwire::Error>(())
/// ```
#[derive(Debug)]
pub struct HostRegistry {
    entries: Vec<HostRef>,
    recovery_window: Duration,
}

impl HostRegistry {
    /// Creates a registry from a static host list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if an address is empty, a host serves
    /// no call type, or either capability class has no host.
    pub fn new(hosts: Vec<Host>, recovery_window: Duration) -> Result<Self> {
        for host in &hosts {
            if host.address().trim().is_empty() {
                return Err(Error::Configuration("Host address is empty".to_string()));
            }
            if host.capabilities().is_empty() {
                return Err(Error::Configuration(format!(
                    "Host {} serves neither reads nor writes",
                    host.address()
                )));
            }
        }

        for call_type in [CallType::Read, CallType::Write] {
            if !hosts.iter().any(|h| h.capabilities().contains(call_type)) {
                return Err(Error::Configuration(format!(
                    "No host configured for {} requests",
                    call_type
                )));
            }
        }

        let entries = hosts.into_iter().map(HostRef::detached).collect();

        Ok(Self {
            entries,
            recovery_window,
        })
    }

    /// The time a failed host stays out of rotation.
    pub fn recovery_window(&self) -> Duration {
        self.recovery_window
    }

    /// Returns the hosts eligible for `call_type`, lowest priority first.
    ///
    /// `None` selects every host regardless of capability. Hosts marked down
    /// less than the recovery window ago are left out; older ones are put
    /// back into rotation.
    pub fn candidate_hosts(&self, call_type: Option<CallType>) -> Vec<HostRef> {
        self.candidate_hosts_at(call_type, Instant::now())
    }

    /// Like [`candidate_hosts`](Self::candidate_hosts), evaluated at `now`.
    pub fn candidate_hosts_at(&self, call_type: Option<CallType>, now: Instant) -> Vec<HostRef> {
        let mut candidates: Vec<HostRef> = self
            .entries
            .iter()
            .filter(|entry| call_type.map_or(true, |ct| entry.capabilities().contains(ct)))
            .filter(|entry| self.is_available(entry, now))
            .cloned()
            .collect();

        // Stable: equal priorities keep registration order.
        candidates.sort_by_key(HostRef::priority);
        candidates
    }

    fn is_available(&self, entry: &HostRef, now: Instant) -> bool {
        let mut health = entry.0.lock();
        if health.healthy {
            return true;
        }

        let down_since = health.last_state_change.unwrap_or(now);
        if now.saturating_duration_since(down_since) < self.recovery_window {
            return false;
        }

        health.healthy = true;
        health.last_state_change = None;
        drop(health);

        tracing::info!(
            host = %entry.address(),
            recovery_window_secs = self.recovery_window.as_secs(),
            "Host back in rotation after recovery window"
        );
        true
    }

    /// Records the outcome of an attempt against `host`.
    ///
    /// A retryable failure marks the host down; a success marks it up.
    /// Fatal failures say nothing about the host and leave it untouched.
    pub fn report_outcome(&self, host: &HostRef, outcome: &Outcome) {
        self.report_outcome_at(host, outcome, Instant::now());
    }

    /// Like [`report_outcome`](Self::report_outcome), stamped with `now`.
    pub fn report_outcome_at(&self, host: &HostRef, outcome: &Outcome, now: Instant) {
        match outcome {
            Outcome::Success(_) => {
                let mut health = host.0.lock();
                let was_down = !health.healthy;
                health.healthy = true;
                health.last_state_change = None;
                drop(health);

                if was_down {
                    tracing::info!(host = %host.address(), "Host answered, marked healthy");
                }
            }
            Outcome::RetryableFailure(error) => {
                let mut health = host.0.lock();
                health.healthy = false;
                health.last_state_change = Some(now);
                drop(health);

                tracing::warn!(
                    host = %host.address(),
                    error = %error,
                    "Host marked down"
                );
            }
            Outcome::FatalFailure(_) => {}
        }
    }

    /// Returns the registered host at `address`, or a one-off host serving
    /// every call type when the address is not registered.
    pub fn resolve(&self, address: &str) -> HostRef {
        self.entries
            .iter()
            .find(|entry| entry.address() == address)
            .cloned()
            .unwrap_or_else(|| HostRef::detached(Host::read_write(address, 0)))
    }

    /// Puts every host back into rotation.
    pub fn reset(&self) {
        for entry in &self.entries {
            let mut health = entry.0.lock();
            health.healthy = true;
            health.last_state_change = None;
        }
    }

    /// Returns a snapshot of every host in registration order.
    pub fn hosts(&self) -> Vec<HostSnapshot> {
        self.entries
            .iter()
            .map(|entry| {
                let health = *entry.0.lock();
                HostSnapshot {
                    address: entry.address().to_string(),
                    capabilities: entry.capabilities(),
                    priority: entry.priority(),
                    healthy: health.healthy,
                    last_state_change: health.last_state_change,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::HttpReply;
    use http::{HeaderMap, StatusCode};

    fn registry() -> HostRegistry {
        HostRegistry::new(
            vec![
                Host::read_write("fallback-b", 2),
                Host::read("dsn", 0),
                Host::write("primary", 0),
                Host::read_write("fallback-a", 1),
                Host::read_write("fallback-c", 2),
            ],
            Duration::from_secs(300),
        )
        .unwrap()
    }

    fn addresses(hosts: &[HostRef]) -> Vec<&str> {
        hosts.iter().map(HostRef::address).collect()
    }

    fn retryable() -> Outcome {
        Outcome::RetryableFailure(Error::Timeout {
            host: "x".to_string(),
            after: Duration::from_secs(1),
        })
    }

    fn success() -> Outcome {
        Outcome::Success(HttpReply {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: "{}".to_string(),
        })
    }

    #[test]
    fn test_candidates_filtered_by_capability_and_ordered() {
        let registry = registry();

        let reads = registry.candidate_hosts(Some(CallType::Read));
        assert_eq!(
            addresses(&reads),
            ["dsn", "fallback-a", "fallback-b", "fallback-c"]
        );

        let writes = registry.candidate_hosts(Some(CallType::Write));
        assert_eq!(
            addresses(&writes),
            ["primary", "fallback-a", "fallback-b", "fallback-c"]
        );

        let any = registry.candidate_hosts(None);
        assert_eq!(any.len(), 5);
        assert!(any.windows(2).all(|w| w[0].priority() <= w[1].priority()));
    }

    #[test]
    fn test_unhealthy_host_excluded_until_window_elapses() {
        let registry = registry();
        let t0 = Instant::now();
        let dsn = registry.resolve("dsn");

        registry.report_outcome_at(&dsn, &retryable(), t0);

        let just_before = t0 + Duration::from_secs(299);
        let reads = registry.candidate_hosts_at(Some(CallType::Read), just_before);
        assert!(!addresses(&reads).contains(&"dsn"));

        let at_window = t0 + Duration::from_secs(300);
        let reads = registry.candidate_hosts_at(Some(CallType::Read), at_window);
        assert_eq!(addresses(&reads)[0], "dsn");
        assert!(dsn.is_healthy());
    }

    #[test]
    fn test_success_marks_host_healthy_immediately() {
        let registry = registry();
        let primary = registry.resolve("primary");

        registry.report_outcome(&primary, &retryable());
        assert!(!primary.is_healthy());

        registry.report_outcome(&primary, &success());
        assert!(primary.is_healthy());
        let snapshot = registry
            .hosts()
            .into_iter()
            .find(|h| h.address == "primary")
            .unwrap();
        assert!(snapshot.healthy);
        assert!(snapshot.last_state_change.is_none());
    }

    #[test]
    fn test_fatal_outcome_leaves_health_untouched() {
        let registry = registry();
        let dsn = registry.resolve("dsn");
        let fatal = Outcome::FatalFailure(Error::FatalRequest {
            status: StatusCode::BAD_REQUEST,
            raw_response: "bad".to_string(),
            headers: HeaderMap::new(),
            rate_limit_info: None,
            host: "dsn".to_string(),
        });

        registry.report_outcome(&dsn, &fatal);
        assert!(dsn.is_healthy());
    }

    #[test]
    fn test_all_hosts_down_yields_no_candidates() {
        let registry = HostRegistry::new(
            vec![Host::read_write("only", 0)],
            Duration::from_secs(300),
        )
        .unwrap();
        let only = registry.resolve("only");
        registry.report_outcome(&only, &retryable());

        assert!(registry.candidate_hosts(Some(CallType::Read)).is_empty());

        registry.reset();
        assert_eq!(registry.candidate_hosts(Some(CallType::Read)).len(), 1);
    }

    #[test]
    fn test_resolve_unknown_address_is_detached() {
        let registry = registry();
        let custom = registry.resolve("custom.example.com");
        registry.report_outcome(&custom, &retryable());

        assert!(!custom.is_healthy());
        assert!(registry.hosts().iter().all(|h| h.healthy));
    }

    #[test]
    fn test_construction_requires_both_capability_classes() {
        let err = HostRegistry::new(vec![Host::read("dsn", 0)], DEFAULT_RECOVERY_WINDOW)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("write")));

        let err = HostRegistry::new(vec![], DEFAULT_RECOVERY_WINDOW).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = HostRegistry::new(
            vec![Host::read_write("  ", 0)],
            DEFAULT_RECOVERY_WINDOW,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_concurrent_reports_keep_state_consistent() {
        let registry = Arc::new(registry());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let host = registry.resolve("fallback-a");
                    for _ in 0..500 {
                        if i % 2 == 0 {
                            registry.report_outcome(&host, &retryable());
                        } else {
                            registry.report_outcome(&host, &success());
                        }
                        let _ = registry.candidate_hosts(Some(CallType::Read));
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }

        let snapshot = registry
            .hosts()
            .into_iter()
            .find(|h| h.address == "fallback-a")
            .unwrap();
        // The two fields always change together.
        assert_eq!(snapshot.healthy, snapshot.last_state_change.is_none());
    }
}
