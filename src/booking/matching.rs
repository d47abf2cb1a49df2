//! Assignment-vs-target matching
//!
//! Exact equality wins outright. Otherwise the word-set similarity and substring containment
//! are both considered: near-identical word sets report `Fuzzy` even when one name also
//! contains the other, and containment catches the remaining partial names. Either way the
//! `matched` flag is the same; only the reported tier differs.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Minimum word-set Jaccard similarity accepted as a fuzzy match (inclusive)
pub const FUZZY_THRESHOLD: f64 = 0.8;

/// Confidence level at which an assignment was judged equivalent to the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    Exact,
    Containment,
    Fuzzy,
    None,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::Exact => "exact",
            MatchTier::Containment => "containment",
            MatchTier::Fuzzy => "fuzzy",
            MatchTier::None => "none",
        }
    }
}

impl std::fmt::Display for MatchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDecision {
    pub matched: bool,
    pub tier: MatchTier,
}

impl MatchDecision {
    fn hit(tier: MatchTier) -> Self {
        Self {
            matched: true,
            tier,
        }
    }

    fn miss() -> Self {
        Self {
            matched: false,
            tier: MatchTier::None,
        }
    }
}

/// Judge whether `assigned` names the same facility as `target`
pub fn evaluate(assigned: &str, target: &str) -> MatchDecision {
    let assigned = assigned.trim().to_lowercase();
    let target = target.trim().to_lowercase();

    if assigned == target {
        return MatchDecision::hit(MatchTier::Exact);
    }

    // An empty side would "contain" trivially
    if assigned.is_empty() || target.is_empty() {
        return MatchDecision::miss();
    }

    if word_similarity(&assigned, &target) >= FUZZY_THRESHOLD {
        return MatchDecision::hit(MatchTier::Fuzzy);
    }

    if assigned.contains(&target) || target.contains(&assigned) {
        return MatchDecision::hit(MatchTier::Containment);
    }

    MatchDecision::miss()
}

/// Jaccard similarity of the whitespace-separated word sets; 0 when either set is empty
pub fn word_similarity(a: &str, b: &str) -> f64 {
    let a: HashSet<&str> = a.split_whitespace().collect();
    let b: HashSet<&str> = b.split_whitespace().collect();

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    intersection as f64 / union as f64
}
