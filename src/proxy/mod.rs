//! Egress proxy pool
//!
//! This module provides the endpoint pool and everything it is built from:
//! - Feed sources and candidate parsing
//! - Liveness probing with bounded concurrency
//! - The persisted verified-endpoint cache
//! - Latency-ordered rotation with banning

pub mod cache;
pub mod feed;
pub mod pool;
pub mod probe;

pub use cache::ProxyCache;
pub use feed::{FeedSource, HttpFeedSource};
pub use pool::ProxyPool;
pub use probe::{validate_batch, EndpointProber, HttpProber};
