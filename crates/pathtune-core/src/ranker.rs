//! Ranking and winner selection
//!
//! Successes come first in ascending latency, failures after them in the
//! order they were probed. Equal latencies keep input order, so the same
//! input always ranks the same way.

use crate::{probe::ProbeResult, Candidate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{info, warn};

/// Results in rank order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedList(Vec<ProbeResult>);

impl RankedList {
    /// Number of ranked results
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in rank order
    pub fn iter(&self) -> impl Iterator<Item = &ProbeResult> {
        self.0.iter()
    }

    /// Best entry
    pub fn first(&self) -> Option<&ProbeResult> {
        self.0.first()
    }

    /// Reachable entries only, still in rank order
    pub fn reachable(&self) -> impl Iterator<Item = &ProbeResult> {
        self.0.iter().filter(|r| r.is_success())
    }

    /// Unwrap into the ordered results
    pub fn into_inner(self) -> Vec<ProbeResult> {
        self.0
    }
}

impl AsRef<[ProbeResult]> for RankedList {
    fn as_ref(&self) -> &[ProbeResult] {
        &self.0
    }
}

/// Outcome of winner selection
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Fastest reachable candidate
    Winner(Candidate),
    /// Nothing was reachable; keep the existing configuration
    NoneAvailable,
}

impl Selection {
    /// Winner, if any
    pub fn winner(&self) -> Option<&Candidate> {
        match self {
            Self::Winner(c) => Some(c),
            Self::NoneAvailable => None,
        }
    }
}

/// Rank probe results
pub fn rank(results: impl IntoIterator<Item = ProbeResult>) -> RankedList {
    let mut ranked: Vec<_> = results.into_iter().collect();
    // sort_by is stable
    ranked.sort_by(compare);
    RankedList(ranked)
}

/// Pick the first ranked entry if it is reachable
pub fn select_winner(list: &RankedList) -> Selection {
    match list.first() {
        Some(best) if best.is_success() => {
            info!(
                winner = %best.candidate.name,
                latency_ms = best.latency_ms().unwrap_or_default(),
                "selected candidate"
            );
            Selection::Winner(best.candidate.clone())
        }
        _ => {
            warn!(candidates = list.len(), "no candidate reachable");
            Selection::NoneAvailable
        }
    }
}

#[inline]
fn compare(a: &ProbeResult, b: &ProbeResult) -> Ordering {
    let (a_failed, a_latency) = key(a);
    let (b_failed, b_latency) = key(b);
    a_failed
        .cmp(&b_failed)
        .then_with(|| a_latency.total_cmp(&b_latency))
}

#[inline]
fn key(result: &ProbeResult) -> (bool, f64) {
    match result.latency_ms() {
        Some(latency) => (false, latency),
        None => (true, f64::INFINITY),
    }
}
