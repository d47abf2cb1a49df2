use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::PoolStats;
use crate::booking::matching::MatchTier;

/// Process-wide run counters
///
/// Accumulates for the life of one orchestrator until reset explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub attempts: u64,
    pub matches_found: u64,
    pub endpoints_consumed: u64,
    /// Cumulative wall-clock time spent inside `start()`
    pub total_time: Duration,
}

/// Snapshot for a control surface
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub running: bool,
    pub current_attempt: u32,
    pub max_retries: u32,
    pub target: Option<String>,
    pub candidate_summary: String,
    pub statistics: RunStatistics,
    pub pool: PoolStats,
}

/// Progress notifications published while a run is active
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AttemptEvent {
    RunStarted {
        run_id: String,
        target: String,
    },
    AttemptStarted {
        attempt: u32,
        max_retries: u32,
    },
    AssignmentObserved {
        attempt: u32,
        assigned: String,
        tier: MatchTier,
        matched: bool,
    },
    AttemptFailed {
        attempt: u32,
        step: String,
        reason: String,
    },
    BookingCompleted {
        attempt: u32,
        payment_url: String,
    },
    RunFinished {
        success: bool,
        attempts: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_event_serializes_with_tag() {
        let event = AttemptEvent::AssignmentObserved {
            attempt: 3,
            assigned: "Green Crescent".to_string(),
            tier: MatchTier::Containment,
            matched: true,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "assignment_observed");
        assert_eq!(value["tier"], "containment");
        assert_eq!(value["attempt"], 3);
    }
}
