//! Scripted collaborators for unit tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::booking::driver::{
    ControlDescriptor, DriverError, FieldMap, ResponseCapture, SessionDriver, SessionHandle,
};
use crate::booking::records::{BookingRecord, SuccessSink};
use crate::error::{BookerError, Result};
use crate::models::{purpose, ProxyEndpoint};
use crate::proxy::{EndpointProber, FeedSource};

/// Feed that returns the same lines for every URL and counts fetches
pub struct CountingFeed {
    lines: Vec<String>,
    fail: bool,
    fetches: AtomicUsize,
}

impl CountingFeed {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            fail: false,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(&[])
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for CountingFeed {
    async fn fetch(&self, feed_url: &str) -> Result<Vec<String>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(BookerError::FeedUnavailable {
                url: feed_url.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(self.lines.clone())
    }
}

/// Prober that succeeds only for scripted addresses
#[derive(Default)]
pub struct ScriptedProber {
    latencies: HashMap<String, f64>,
    delay: Option<Duration>,
    probes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, address: &str, latency_secs: f64) -> Self {
        self.latencies.insert(address.to_string(), latency_secs);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EndpointProber for ScriptedProber {
    async fn probe(&self, address: &str) -> Result<Duration> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.latencies.get(address) {
            Some(latency) => Ok(Duration::from_secs_f64(*latency)),
            None => Err(BookerError::ProbeFailed(format!("{} did not answer", address))),
        }
    }
}

/// Session driver with scripted results that tracks open sessions
pub struct ScriptedDriver {
    fields: FieldMap,
    open_failures: Mutex<VecDeque<DriverError>>,
    navigate_ok: bool,
    hung_fill: Option<String>,
    hung_close: bool,
    clickable: HashSet<String>,
    urls: Mutex<VecDeque<String>>,
    last_url: Mutex<String>,
    next_id: AtomicUsize,
    opens: AtomicUsize,
    closes: AtomicUsize,
    open_sessions: Mutex<HashSet<String>>,
    opened_via: Mutex<Vec<String>>,
    fills: Mutex<Vec<(String, String)>>,
    clicks: Mutex<Vec<String>>,
}

impl ScriptedDriver {
    /// Every purpose is discoverable; the generic submit button and the terms box are clickable
    pub fn new() -> Self {
        let fields = purpose::ALL
            .iter()
            .map(|p| (p.to_string(), ControlDescriptor::new(format!("#{}", p))))
            .collect();

        Self {
            fields,
            open_failures: Mutex::new(VecDeque::new()),
            navigate_ok: true,
            hung_fill: None,
            hung_close: false,
            clickable: [
                "button[type='submit']",
                "input[type='checkbox'][name*='terms']",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            urls: Mutex::new(VecDeque::new()),
            last_url: Mutex::new(String::new()),
            next_id: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            open_sessions: Mutex::new(HashSet::new()),
            opened_via: Mutex::new(Vec::new()),
            fills: Mutex::new(Vec::new()),
            clicks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fields(mut self, fields: FieldMap) -> Self {
        self.fields = fields;
        self
    }

    /// Fail the next opens with these errors, in order
    pub fn failing_open(self, errors: Vec<DriverError>) -> Self {
        *self.open_failures.lock() = errors.into();
        self
    }

    pub fn navigate_fails(mut self) -> Self {
        self.navigate_ok = false;
        self
    }

    /// Filling `purpose` never completes
    pub fn hangs_on_fill(mut self, purpose: &str) -> Self {
        self.hung_fill = Some(purpose.to_string());
        self
    }

    /// Closing a session never completes
    pub fn hangs_on_close(mut self) -> Self {
        self.hung_close = true;
        self
    }

    pub fn with_clickable(mut self, locators: &[&str]) -> Self {
        self.clickable = locators.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Successive `current_url` results; the last one sticks
    pub fn with_urls(self, urls: &[&str]) -> Self {
        *self.urls.lock() = urls.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Sessions opened and not yet closed
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.lock().len()
    }

    /// Endpoints of the successfully opened sessions, in order
    pub fn opened_via(&self) -> Vec<String> {
        self.opened_via.lock().clone()
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.fills.lock().clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.clicks.lock().clone()
    }
}

#[async_trait]
impl SessionDriver for ScriptedDriver {
    async fn open(
        &self,
        endpoint: &ProxyEndpoint,
    ) -> std::result::Result<SessionHandle, DriverError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.open_failures.lock().pop_front() {
            return Err(err);
        }

        let id = format!("session-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.open_sessions.lock().insert(id.clone());
        self.opened_via.lock().push(endpoint.address.clone());
        Ok(SessionHandle(id))
    }

    async fn navigate(&self, _handle: &SessionHandle, _url: &str) -> bool {
        self.navigate_ok
    }

    async fn discover_fields(&self, _handle: &SessionHandle) -> FieldMap {
        self.fields.clone()
    }

    async fn fill(&self, _handle: &SessionHandle, purpose: &str, value: &str) -> bool {
        self.fills
            .lock()
            .push((purpose.to_string(), value.to_string()));
        if self.hung_fill.as_deref() == Some(purpose) {
            std::future::pending::<()>().await;
        }
        self.fields.contains_key(purpose)
    }

    async fn click(&self, _handle: &SessionHandle, control: &ControlDescriptor) -> bool {
        self.clicks.lock().push(control.as_str().to_string());
        self.clickable.contains(control.as_str())
    }

    async fn current_url(&self, _handle: &SessionHandle) -> String {
        let next = self.urls.lock().pop_front();
        let mut last = self.last_url.lock();
        if let Some(url) = next {
            *last = url;
        }
        last.clone()
    }

    async fn close(&self, handle: &SessionHandle) {
        if self.hung_close {
            std::future::pending::<()>().await;
        }
        if self.open_sessions.lock().remove(&handle.0) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Capture that replays scripted bodies, then keeps returning the fallback
pub struct ScriptedCapture {
    responses: Mutex<VecDeque<Option<Value>>>,
    fallback: Option<Value>,
}

impl ScriptedCapture {
    pub fn new(fallback: Option<Value>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback,
        }
    }

    pub fn with_responses(self, responses: Vec<Option<Value>>) -> Self {
        *self.responses.lock() = responses.into();
        self
    }
}

#[async_trait]
impl ResponseCapture for ScriptedCapture {
    async fn await_response(&self, _handle: &SessionHandle, _timeout: Duration) -> Option<Value> {
        let next = self.responses.lock().pop_front();
        match next {
            Some(response) => response,
            None => self.fallback.clone(),
        }
    }
}

/// Success sink that keeps records in memory
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<BookingRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<BookingRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl SuccessSink for MemorySink {
    async fn record_success(&self, record: &BookingRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}
