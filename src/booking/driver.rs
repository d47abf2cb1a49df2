//! Session driver and response capture contracts
//!
//! The browser-like session lives outside this crate. The orchestrator only relies on these
//! traits and on the purpose vocabulary in [`crate::models::purpose`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::ProxyEndpoint;

/// Opaque identifier of one open session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub String);

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Driver-specific locator of a page control (a CSS selector for browser drivers)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControlDescriptor(pub String);

impl ControlDescriptor {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ControlDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discovered controls keyed by canonical purpose name
pub type FieldMap = BTreeMap<String, ControlDescriptor>;

#[derive(Error, Debug)]
pub enum DriverError {
    /// The endpoint itself refused or dropped the connection
    #[error("proxy unreachable: {0}")]
    ProxyUnreachable(String),

    #[error("session error: {0}")]
    Session(String),
}

/// Browser-like session bound to one egress endpoint
///
/// Boolean results mean "the driver did it"; `false` is an ordinary outcome, not an error.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Open a fresh session routed through `endpoint` with no state from earlier sessions
    async fn open(&self, endpoint: &ProxyEndpoint) -> Result<SessionHandle, DriverError>;

    /// Load `url` and wait until the page is ready
    async fn navigate(&self, handle: &SessionHandle, url: &str) -> bool;

    /// Map of fillable controls on the current page, empty when none were recognised
    async fn discover_fields(&self, handle: &SessionHandle) -> FieldMap;

    /// Fill the control discovered for `purpose`
    async fn fill(&self, handle: &SessionHandle, purpose: &str, value: &str) -> bool;

    async fn click(&self, handle: &SessionHandle, control: &ControlDescriptor) -> bool;

    async fn current_url(&self, handle: &SessionHandle) -> String;

    /// Tear the session down and clear its cookies and storage
    ///
    /// Must be idempotent.
    async fn close(&self, handle: &SessionHandle);
}

/// Observer of the network exchanges of a session
#[async_trait]
pub trait ResponseCapture: Send + Sync {
    /// First response body carrying an assignment signal, or None after `timeout`
    async fn await_response(&self, handle: &SessionHandle, timeout: Duration) -> Option<Value>;
}
