//! Booking attempt engine
//!
//! This module provides the attempt loop and what it talks to:
//! - Session driver and response capture contracts
//! - Assignment extraction and matching
//! - Candidate input and booking output
//! - The retry orchestrator itself

pub mod context;
pub mod controls;
pub mod driver;
pub mod extract;
pub mod matching;
pub mod orchestrator;
pub mod records;

pub use context::AttemptContext;
pub use driver::{
    ControlDescriptor, DriverError, FieldMap, ResponseCapture, SessionDriver, SessionHandle,
};
pub use extract::extract_assignment;
pub use matching::{evaluate, MatchDecision, MatchTier};
pub use orchestrator::{AttemptOrchestrator, Step};
pub use records::{
    BookingRecord, CandidateSource, JsonCandidateSource, JsonlSuccessSink, SuccessSink,
};
