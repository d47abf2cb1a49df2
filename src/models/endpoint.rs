use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Verified egress endpoint
///
/// Identity is the `host:port` address; two endpoints with the same address are the same
/// endpoint regardless of their measurements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    #[serde(rename = "proxy")]
    pub address: String,
    /// Round-trip latency of the last successful probe, in seconds
    #[serde(rename = "response_time")]
    pub latency_secs: f64,
    #[serde(rename = "tested_at")]
    pub last_verified: DateTime<Utc>,
    #[serde(default)]
    pub success_count: u32,
    /// Consecutive failures since the last healthy use
    #[serde(default)]
    pub failure_count: u32,
}

impl ProxyEndpoint {
    /// Endpoint that just passed a liveness probe
    pub fn verified(address: impl Into<String>, latency_secs: f64) -> Self {
        Self {
            address: address.into(),
            latency_secs,
            last_verified: Utc::now(),
            success_count: 1,
            failure_count: 0,
        }
    }

    /// Proxy URL handed to a session driver
    pub fn url(&self) -> String {
        format!("http://{}", self.address)
    }

    /// Record a use that went through cleanly; `last_verified` stays tied to probes
    pub fn record_success(&mut self) {
        self.success_count = self.success_count.saturating_add(1);
        self.failure_count = 0;
    }

    /// Record a higher-layer failure; returns the consecutive failure count
    pub fn record_failure(&mut self) -> u32 {
        self.failure_count = self.failure_count.saturating_add(1);
        self.failure_count
    }
}

impl PartialEq for ProxyEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for ProxyEndpoint {}

impl std::fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Outcome reported when an endpoint is handed back to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointUsage {
    /// The endpoint carried the session fine
    Healthy,
    /// Session or page-level failure; counts toward the soft-failure ban threshold
    SoftFailure,
}

/// Read-only snapshot of the pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub verified: usize,
    pub dispensed: usize,
    pub remaining: usize,
    pub banned: usize,
}

/// On-disk layout of the verified-endpoint cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheFile {
    pub proxies: Vec<ProxyEndpoint>,
    pub last_updated: DateTime<Utc>,
    pub total_count: usize,
}

impl CacheFile {
    pub fn new(proxies: Vec<ProxyEndpoint>) -> Self {
        let total_count = proxies.len();
        Self {
            proxies,
            last_updated: Utc::now(),
            total_count,
        }
    }
}
