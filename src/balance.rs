//! Server selection across a cluster: health tracking and balancing
//! strategies.
//!
//! These are the seams a pool plugs into; the session itself knows nothing
//! about clusters. All strategies take `&self` and are safe under
//! concurrent callers.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::seq::SliceRandom;

/// One server address in a cluster.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// Native protocol port.
    pub port: u16,
}

impl Endpoint {
    /// An endpoint for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Health view of cluster endpoints, fed by connection outcomes.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Is this endpoint currently usable?
    async fn is_healthy(&self, endpoint: &Endpoint) -> bool;

    /// Record a failed dial, ping, or poisoned session.
    fn report_failure(&self, endpoint: &Endpoint);

    /// Record a successful operation.
    fn report_success(&self, endpoint: &Endpoint);
}

/// Consecutive-failure health tracking: `threshold` failures in a row mark
/// an endpoint unhealthy; one success restores it.
pub struct FailureWindow {
    threshold: u32,
    counters: Mutex<HashMap<Endpoint, u32>>,
}

impl FailureWindow {
    /// Default failure threshold.
    pub const DEFAULT_THRESHOLD: u32 = 3;

    /// Tracker with the default threshold.
    pub fn new() -> Self {
        Self::with_threshold(Self::DEFAULT_THRESHOLD)
    }

    /// Tracker marking endpoints unhealthy after `threshold` consecutive
    /// failures.
    pub fn with_threshold(threshold: u32) -> Self {
        Self { threshold: threshold.max(1), counters: Mutex::new(HashMap::new()) }
    }

    /// Consecutive failures currently recorded for an endpoint.
    pub fn failure_count(&self, endpoint: &Endpoint) -> u32 {
        self.counters.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }
}

impl Default for FailureWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthCheck for FailureWindow {
    async fn is_healthy(&self, endpoint: &Endpoint) -> bool {
        self.failure_count(endpoint) < self.threshold
    }

    fn report_failure(&self, endpoint: &Endpoint) {
        let mut counters = self.counters.lock().unwrap();
        *counters.entry(endpoint.clone()).or_insert(0) += 1;
    }

    fn report_success(&self, endpoint: &Endpoint) {
        self.counters.lock().unwrap().remove(endpoint);
    }
}

/// Picks the next server for a new session.
#[async_trait]
pub trait LoadBalancer: Send + Sync {
    /// The next endpoint to try, or `None` when no server is healthy.
    async fn next_server(&self) -> Option<Endpoint>;
}

/// Rotates through the healthy subset with an atomic cursor.
pub struct RoundRobin {
    endpoints: Vec<Endpoint>,
    health: Arc<dyn HealthCheck>,
    cursor: AtomicUsize,
}

impl RoundRobin {
    /// A round-robin balancer over `endpoints`.
    pub fn new(endpoints: Vec<Endpoint>, health: Arc<dyn HealthCheck>) -> Self {
        Self { endpoints, health, cursor: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl LoadBalancer for RoundRobin {
    async fn next_server(&self) -> Option<Endpoint> {
        if self.endpoints.is_empty() {
            return None;
        }
        // One full lap past unhealthy entries, then give up.
        for _ in 0..self.endpoints.len() {
            let slot = self.cursor.fetch_add(1, Ordering::Relaxed)
                % self.endpoints.len();
            let candidate = &self.endpoints[slot];
            if self.health.is_healthy(candidate).await {
                return Some(candidate.clone());
            }
        }
        None
    }
}

/// Always the lowest-indexed healthy endpoint.
pub struct FirstAvailable {
    endpoints: Vec<Endpoint>,
    health: Arc<dyn HealthCheck>,
}

impl FirstAvailable {
    /// A first-available balancer over `endpoints`.
    pub fn new(endpoints: Vec<Endpoint>, health: Arc<dyn HealthCheck>) -> Self {
        Self { endpoints, health }
    }
}

#[async_trait]
impl LoadBalancer for FirstAvailable {
    async fn next_server(&self) -> Option<Endpoint> {
        for candidate in &self.endpoints {
            if self.health.is_healthy(candidate).await {
                return Some(candidate.clone());
            }
        }
        None
    }
}

/// Uniformly random over the healthy subset.
pub struct Random {
    endpoints: Vec<Endpoint>,
    health: Arc<dyn HealthCheck>,
}

impl Random {
    /// A random balancer over `endpoints`.
    pub fn new(endpoints: Vec<Endpoint>, health: Arc<dyn HealthCheck>) -> Self {
        Self { endpoints, health }
    }
}

#[async_trait]
impl LoadBalancer for Random {
    async fn next_server(&self) -> Option<Endpoint> {
        let mut healthy = Vec::with_capacity(self.endpoints.len());
        for candidate in &self.endpoints {
            if self.health.is_healthy(candidate).await {
                healthy.push(candidate);
            }
        }
        healthy.choose(&mut rand::thread_rng()).map(|&e| e.clone())
    }
}
