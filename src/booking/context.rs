use std::sync::Arc;

use super::driver::{FieldMap, SessionHandle};
use crate::models::{AppointmentPayload, CandidateRecord, ProxyEndpoint};

/// Working state of one loop iteration
///
/// Dropped at the end of the iteration together with its session; nothing in here carries
/// over to the next attempt.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    /// 1-based attempt ordinal
    pub attempt: u32,
    pub max_retries: u32,
    pub endpoint: ProxyEndpoint,
    pub session: Option<SessionHandle>,
    pub fields: FieldMap,
    pub appointment: AppointmentPayload,
    pub candidate: Arc<CandidateRecord>,
}

impl AttemptContext {
    pub fn new(
        attempt: u32,
        max_retries: u32,
        endpoint: ProxyEndpoint,
        candidate: Arc<CandidateRecord>,
    ) -> Self {
        Self {
            attempt,
            max_retries,
            endpoint,
            session: None,
            fields: FieldMap::new(),
            appointment: candidate.appointment(),
            candidate,
        }
    }

    /// Whether discovery found a control for `purpose`
    pub fn has_field(&self, purpose: &str) -> bool {
        self.fields.contains_key(purpose)
    }
}

impl std::fmt::Display for AttemptContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "attempt {}/{} via {}",
            self.attempt, self.max_retries, self.endpoint
        )
    }
}
