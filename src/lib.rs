//! Rota Booker - proxy-rotated booking attempts
//!
//! Repeats a two-phase booking workflow through rotating egress proxies until the server
//! assigns the wanted facility.
//!
//! ## Features
//!
//! - Self-replenishing proxy pool with concurrent liveness probing and a persisted cache
//! - Latency-ordered rotation with banning of endpoints that fail in use
//! - Bounded, cancellable attempt loop over pluggable session driver and response capture
//! - Exact, containment and word-set fuzzy matching of the assigned facility
//! - Structured attempt events for control surfaces

pub mod booking;
pub mod config;
pub mod error;
pub mod models;
pub mod proxy;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;

pub use booking::AttemptOrchestrator;
pub use config::Config;
pub use error::{BookerError, Result};
pub use proxy::ProxyPool;
