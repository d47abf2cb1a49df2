//! Verified egress endpoint pool
//!
//! Endpoints are dispensed lowest-latency first, each at most once per rotation cycle. Once
//! every verified endpoint has been handed out the cycle starts over. Anything that fails in
//! real use is banned and never comes back for the life of the pool.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use super::cache::ProxyCache;
use super::feed::{normalize_endpoint, parse_feed, FeedSource, HttpFeedSource};
use super::probe::{validate_batch, EndpointProber, HttpProber};
use crate::config::PoolConfig;
use crate::error::Result;
use crate::models::{EndpointUsage, PoolStats, ProxyEndpoint};

/// Nominal latency assigned to configured seed endpoints
const SEED_LATENCY_SECS: f64 = 0.1;

#[derive(Debug, Default)]
struct PoolState {
    /// Sorted ascending by latency
    verified: Vec<ProxyEndpoint>,
    /// Always a subset of the verified addresses
    dispensed: HashSet<String>,
    banned: HashSet<String>,
}

impl PoolState {
    fn position(&self, address: &str) -> Option<usize> {
        self.verified.iter().position(|e| e.address == address)
    }

    fn remove(&mut self, address: &str) -> bool {
        self.dispensed.remove(address);
        match self.position(address) {
            Some(pos) => {
                self.verified.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Add endpoints that are neither verified nor banned yet; returns how many were added
    fn merge(&mut self, endpoints: Vec<ProxyEndpoint>) -> usize {
        let mut added = 0;
        for endpoint in endpoints {
            if self.banned.contains(&endpoint.address) || self.position(&endpoint.address).is_some()
            {
                continue;
            }
            self.verified.push(endpoint);
            added += 1;
        }
        self.verified
            .sort_by(|a, b| a.latency_secs.total_cmp(&b.latency_secs));
        added
    }
}

/// Shared pool of verified endpoints
///
/// All state access is serialized through one lock. Refills are additionally serialized with
/// each other, and the lock is never held while candidates are being probed.
pub struct ProxyPool {
    config: PoolConfig,
    feed: Arc<dyn FeedSource>,
    prober: Arc<dyn EndpointProber>,
    cache: Option<ProxyCache>,
    state: RwLock<PoolState>,
    refill_lock: tokio::sync::Mutex<()>,
}

impl ProxyPool {
    /// Create a pool, loading the persisted verified set if a cache is given
    ///
    /// When nothing was loaded the configured seed endpoints are inserted instead.
    pub fn new(
        config: PoolConfig,
        feed: Arc<dyn FeedSource>,
        prober: Arc<dyn EndpointProber>,
        cache: Option<ProxyCache>,
    ) -> Self {
        let loaded = match &cache {
            Some(cache) => match cache.load() {
                Ok(endpoints) => endpoints,
                Err(e) => {
                    warn!(
                        "Ignoring unreadable proxy cache {}: {}",
                        cache.path().display(),
                        e
                    );
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut state = PoolState::default();
        let restored = state.merge(loaded);
        if restored > 0 {
            info!("Restored {} verified endpoints from cache", restored);
        }

        let pool = Self {
            config,
            feed,
            prober,
            cache,
            state: RwLock::new(state),
            refill_lock: tokio::sync::Mutex::new(()),
        };

        if restored == 0 && !pool.config.seed_endpoints.is_empty() {
            let seeds: Vec<ProxyEndpoint> = pool
                .config
                .seed_endpoints
                .iter()
                .filter_map(|raw| {
                    let address = normalize_endpoint(raw);
                    if address.is_none() {
                        warn!("Skipping malformed seed endpoint {:?}", raw);
                    }
                    address
                })
                .map(|address| ProxyEndpoint::verified(address, SEED_LATENCY_SECS))
                .collect();
            let added = pool.add_verified(seeds);
            info!("Seeded pool with {} endpoints", added);
        }

        pool
    }

    /// Create a pool wired to the HTTP feed source, HTTP prober and on-disk cache
    pub fn from_config(config: &PoolConfig) -> Result<Self> {
        let feed = Arc::new(HttpFeedSource::new(config.feed_timeout)?);
        let prober = Arc::new(HttpProber::new(
            config.echo_urls.clone(),
            config.probe_timeout,
        ));
        let cache = config.cache_path.clone().map(ProxyCache::new);

        Ok(Self::new(config.clone(), feed, prober, cache))
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Insert already-verified endpoints, skipping known and banned addresses
    pub fn add_verified(&self, endpoints: Vec<ProxyEndpoint>) -> usize {
        let mut state = self.state.write();
        let added = state.merge(endpoints);
        if added > 0 {
            self.persist(&state.verified);
        }
        added
    }

    /// Top the pool up to `minimum` verified endpoints
    ///
    /// A no-op when the pool already holds enough. Otherwise pulls every feed, validates one
    /// capped batch of new candidates and merges the survivors. Feed and probe failures are
    /// logged, never returned. Returns the number of endpoints added.
    #[instrument(skip(self))]
    pub async fn refill(&self, minimum: usize) -> usize {
        let _refill = self.refill_lock.lock().await;

        let known: HashSet<String> = {
            let state = self.state.read();
            if state.verified.len() >= minimum {
                debug!(
                    "Pool holds {} verified endpoints, refill not needed",
                    state.verified.len()
                );
                return 0;
            }
            state
                .verified
                .iter()
                .map(|e| e.address.clone())
                .chain(state.banned.iter().cloned())
                .collect()
        };

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for feed_url in &self.config.feed_urls {
            match self.feed.fetch(feed_url).await {
                Ok(lines) => {
                    let parsed = parse_feed(&lines);
                    debug!("Feed {} yielded {} candidates", feed_url, parsed.len());
                    candidates.extend(
                        parsed
                            .into_iter()
                            .filter(|c| !known.contains(c) && seen.insert(c.clone())),
                    );
                }
                Err(e) => warn!("Skipping feed {}: {}", feed_url, e),
            }
        }

        if candidates.len() > self.config.batch_cap {
            debug!(
                "Capping candidate batch from {} to {}",
                candidates.len(),
                self.config.batch_cap
            );
            candidates.truncate(self.config.batch_cap);
        }

        if candidates.is_empty() {
            info!("No new candidate endpoints found");
            return 0;
        }

        let verified = validate_batch(
            self.prober.as_ref(),
            candidates,
            self.config.validation_workers,
        )
        .await;

        let added = self.add_verified(verified);
        info!(
            "Refill added {} endpoints, pool now holds {}",
            added,
            self.state.read().verified.len()
        );
        added
    }

    /// Refill up to the configured minimum
    pub async fn ensure_minimum(&self) -> usize {
        self.refill(self.config.min_verified).await
    }

    /// Next endpoint of the current rotation cycle
    ///
    /// An empty pool is refilled once before giving up.
    pub async fn acquire(&self) -> Option<ProxyEndpoint> {
        let empty = self.state.read().verified.is_empty();
        if empty {
            info!("Pool is empty, refilling before dispensing");
            self.refill(self.config.min_verified.max(1)).await;
        }

        let mut guard = self.state.write();
        let state = &mut *guard;

        if state.verified.is_empty() {
            return None;
        }

        if state
            .verified
            .iter()
            .all(|e| state.dispensed.contains(&e.address))
        {
            debug!(
                "All {} endpoints dispensed, starting a new rotation cycle",
                state.verified.len()
            );
            state.dispensed.clear();
        }

        let endpoint = state
            .verified
            .iter()
            .find(|e| !state.dispensed.contains(&e.address))
            .cloned()?;
        state.dispensed.insert(endpoint.address.clone());

        debug!(
            "Dispensed {} ({:.3}s), {} of {} used this cycle",
            endpoint.address,
            endpoint.latency_secs,
            state.dispensed.len(),
            state.verified.len()
        );
        Some(endpoint)
    }

    /// Report how a dispensed endpoint fared
    ///
    /// Soft failures accumulate; reaching `max_soft_failures` in a row bans the endpoint.
    pub fn release(&self, address: &str, usage: EndpointUsage) {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let Some(pos) = state.position(address) else {
            debug!("Released endpoint {} is no longer in the pool", address);
            return;
        };

        match usage {
            EndpointUsage::Healthy => state.verified[pos].record_success(),
            EndpointUsage::SoftFailure => {
                let failures = state.verified[pos].record_failure();
                if failures >= self.config.max_soft_failures {
                    warn!(
                        "Banning {} after {} consecutive failures",
                        address, failures
                    );
                    state.remove(address);
                    state.banned.insert(address.to_string());
                }
            }
        }

        self.persist(&state.verified);
    }

    /// Remove an endpoint for good; returns whether it was in the pool
    ///
    /// Banning an endpoint that is not in the pool changes nothing.
    pub fn ban(&self, address: &str) -> bool {
        let mut state = self.state.write();
        if !state.remove(address) {
            return false;
        }

        state.banned.insert(address.to_string());
        info!(
            "Banned endpoint {}, {} remain",
            address,
            state.verified.len()
        );
        self.persist(&state.verified);
        true
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.read();
        PoolStats {
            verified: state.verified.len(),
            dispensed: state.dispensed.len(),
            remaining: state.verified.len().saturating_sub(state.dispensed.len()),
            banned: state.banned.len(),
        }
    }

    /// Snapshot of the verified set in dispense order
    pub fn verified_endpoints(&self) -> Vec<ProxyEndpoint> {
        self.state.read().verified.clone()
    }

    fn persist(&self, verified: &[ProxyEndpoint]) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.save(verified) {
                warn!(
                    "Failed to persist proxy cache {}: {}",
                    cache.path().display(),
                    e
                );
            }
        }
    }
}
