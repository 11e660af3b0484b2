//! Plain configuration values consumed at client construction.

use crate::host::{Capabilities, Host, DEFAULT_RECOVERY_WINDOW};
use crate::retry::TimeoutEscalation;
use crate::task::DEFAULT_POLL_INTERVAL;
use crate::{Error, Result};
use http::{HeaderMap, StatusCode};
use rand::seq::SliceRandom;
use std::time::Duration;

/// Default connect budget per attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Default base read budget for read calls.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
/// Default base read budget for write calls.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything a [`Client`](crate::Client) is built from.
///
/// Host resolution, first match wins: `hosts`, then `read_hosts` /
/// `write_hosts`, then the defaults derived from `application_id`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Application whose default hosts are used when no list is given.
    pub application_id: Option<String>,
    /// Complete host list override.
    pub hosts: Vec<Host>,
    /// Read hosts, in priority order.
    pub read_hosts: Vec<String>,
    /// Write hosts, in priority order.
    pub write_hosts: Vec<String>,
    /// URL scheme for every host.
    pub scheme: String,
    /// Connect budget per attempt.
    pub connect_timeout: Duration,
    /// Base read budget for read calls.
    pub read_timeout: Duration,
    /// Base read budget for write calls.
    pub write_timeout: Duration,
    /// How the read budget grows across attempts.
    pub timeout_escalation: TimeoutEscalation,
    /// How long a failed host stays out of rotation.
    pub health_recovery_window: Duration,
    /// Size of an owned worker pool; `None` uses the ambient runtime.
    pub worker_threads: Option<usize>,
    /// Headers sent with every request.
    pub default_headers: HeaderMap,
    /// Server statuses that fail the request instead of failing over.
    pub non_retryable_statuses: Vec<StatusCode>,
    /// Delay between task status polls.
    pub task_poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            application_id: None,
            hosts: Vec::new(),
            read_hosts: Vec::new(),
            write_hosts: Vec::new(),
            scheme: "https".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            timeout_escalation: TimeoutEscalation::default(),
            health_recovery_window: DEFAULT_RECOVERY_WINDOW,
            worker_threads: None,
            default_headers: HeaderMap::new(),
            non_retryable_statuses: Vec::new(),
            task_poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ClientConfig {
    /// Checks the values that have no sensible fallback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for zero timeouts, a zero poll
    /// interval, or a scheme other than `http`/`https`.
    pub fn validate(&self) -> Result<()> {
        if self.scheme != "https" && self.scheme != "http" {
            return Err(Error::Configuration(format!(
                "Unsupported scheme: {}",
                self.scheme
            )));
        }

        let budgets = [
            ("connect timeout", self.connect_timeout),
            ("read timeout", self.read_timeout),
            ("write timeout", self.write_timeout),
            ("task poll interval", self.task_poll_interval),
        ];
        for (name, value) in budgets {
            if value.is_zero() {
                return Err(Error::Configuration(format!("The {} must be non-zero", name)));
            }
        }

        Ok(())
    }

    /// Resolves the host list the registry is built from.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no hosts and no application id
    /// were configured.
    pub fn resolve_hosts(&self) -> Result<Vec<Host>> {
        if !self.hosts.is_empty() {
            return Ok(self.hosts.clone());
        }

        if !self.read_hosts.is_empty() || !self.write_hosts.is_empty() {
            return Ok(merge_capability_lists(&self.read_hosts, &self.write_hosts));
        }

        match &self.application_id {
            Some(app_id) if !app_id.trim().is_empty() => Ok(default_hosts(app_id)),
            _ => Err(Error::Configuration(
                "Either an application id or a host list is required".to_string(),
            )),
        }
    }
}

/// The default host list of an application.
///
/// The DSN host serves reads and the primary host serves writes, both first
/// in line. Three fallback hosts serve both; they are shuffled so that the
/// fallback load spreads across clients.
///
/// ```
/// use searchwire::{config::default_hosts, CallType};
///
/// let hosts = default_hosts("APPID");
/// assert_eq!(hosts[0].address(), "APPID-dsn.algolia.net");
/// assert!(hosts[0].capabilities().contains(CallType::Read));
/// assert_eq!(hosts.len(), 5);
/// ```
pub fn default_hosts(application_id: &str) -> Vec<Host> {
    let mut fallbacks: Vec<String> = (1..=3)
        .map(|n| format!("{}-{}.algolianet.com", application_id, n))
        .collect();
    fallbacks.shuffle(&mut rand::thread_rng());

    let mut hosts = vec![
        Host::read(format!("{}-dsn.algolia.net", application_id), 0),
        Host::write(format!("{}.algolia.net", application_id), 0),
    ];
    hosts.extend(
        fallbacks
            .into_iter()
            .zip(1u32..)
            .map(|(address, priority)| Host::read_write(address, priority)),
    );
    hosts
}

/// Merges per-capability lists; an address in both lists serves both.
/// Priority is the position within the list the host first appears in.
fn merge_capability_lists(read_hosts: &[String], write_hosts: &[String]) -> Vec<Host> {
    let mut hosts: Vec<Host> = Vec::new();

    let tagged = read_hosts
        .iter()
        .enumerate()
        .map(|(i, a)| (a, Capabilities::READ, i))
        .chain(
            write_hosts
                .iter()
                .enumerate()
                .map(|(i, a)| (a, Capabilities::WRITE, i)),
        );

    for (address, capability, position) in tagged {
        match hosts.iter_mut().find(|h| h.address() == address) {
            Some(existing) => {
                *existing = Host::new(
                    address.clone(),
                    existing.capabilities().union(capability),
                    existing.priority(),
                );
            }
            None => hosts.push(Host::new(address.clone(), capability, position as u32)),
        }
    }

    hosts
}
