//! Path MTU discovery
//!
//! Walks a caller-supplied, strictly descending list of frame sizes and stops
//! at the first one that crosses the path intact with fragmentation
//! forbidden. A dropped probe counts the same as an explicit "too big"
//! answer: without inspecting ICMP errors the two cannot be told apart.

use crate::{
    error::{EngineError, EngineResult},
    probe::{validate_timeout, ProbeMode, ProbeOutcome, ProbeResult, Prober, ECHO_HEADER_OVERHEAD},
    Candidate,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Common MTU sizes probed by default, largest first
pub const DEFAULT_MTU_SIZES: [u16; 7] = [1500, 1492, 1472, 1450, 1400, 1350, 1300];

/// Reported when no size gets through
pub const DEFAULT_FALLBACK_MTU: u16 = 1500;

/// One size tried during a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MtuSample {
    /// Frame size in bytes
    pub size_bytes: u16,
    /// Rejected as too large, or dropped without acknowledgement
    pub fragmented: bool,
    /// Failed for a reason unrelated to size
    pub probe_failed: bool,
}

impl MtuSample {
    /// Derive a sample from an MTU echo result
    pub fn from_result(size_bytes: u16, result: &ProbeResult) -> Self {
        let (fragmented, probe_failed) = match result.outcome {
            ProbeOutcome::Success { .. } => (false, false),
            ProbeOutcome::Fragmented | ProbeOutcome::Timeout => (true, false),
            ProbeOutcome::ConnectionRefused
            | ProbeOutcome::Unreachable
            | ProbeOutcome::Unresolvable => (false, true),
        };
        Self {
            size_bytes,
            fragmented,
            probe_failed,
        }
    }

    /// Whether this size got through
    pub fn passed(&self) -> bool {
        !self.fragmented && !self.probe_failed
    }
}

/// Search result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "size", rename_all = "snake_case")]
pub enum MtuChoice {
    /// Largest size that crossed the path intact
    Discovered(u16),
    /// No size got through; conventional default
    DefaultFallback(u16),
}

impl MtuChoice {
    /// Chosen size either way
    pub fn size(&self) -> u16 {
        match self {
            Self::Discovered(size) | Self::DefaultFallback(size) => *size,
        }
    }

    /// Whether the size was measured rather than assumed
    pub fn is_discovered(&self) -> bool {
        matches!(self, Self::Discovered(_))
    }
}

/// Choice plus every sample taken to reach it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MtuSearch {
    /// Selected size
    pub choice: MtuChoice,
    /// Samples in the order they were taken
    pub samples: Vec<MtuSample>,
}

/// Descending-size MTU search
#[derive(Clone)]
pub struct MtuFinder {
    prober: Prober,
    fallback: u16,
}

impl MtuFinder {
    /// Create with the default fallback size
    pub fn new(prober: Prober) -> Self {
        Self {
            prober,
            fallback: DEFAULT_FALLBACK_MTU,
        }
    }

    /// Override the fallback size
    pub fn with_fallback(mut self, fallback: u16) -> Self {
        self.fallback = fallback;
        self
    }

    /// Fallback size
    pub fn fallback(&self) -> u16 {
        self.fallback
    }

    /// Find the largest size in `candidate_sizes` that reaches `target`
    /// without fragmenting.
    ///
    /// Sizes must be strictly descending and larger than the echo headers.
    /// Stops probing at the first size that passes.
    pub async fn find_max_mtu(
        &self,
        target: &Candidate,
        candidate_sizes: &[u16],
        timeout: Duration,
    ) -> EngineResult<MtuSearch> {
        validate_sizes(candidate_sizes)?;
        validate_timeout(timeout)?;

        let mut samples = Vec::with_capacity(candidate_sizes.len());
        for &size in candidate_sizes {
            let result = self
                .prober
                .measure(target, ProbeMode::MtuEcho(size), timeout)
                .await;
            let sample = MtuSample::from_result(size, &result);
            debug!(target = %target.name, size, ?sample, "MTU probe");
            samples.push(sample);

            if sample.passed() {
                info!(target = %target.name, mtu = size, probes = samples.len(), "path MTU discovered");
                return Ok(MtuSearch {
                    choice: MtuChoice::Discovered(size),
                    samples,
                });
            }
        }

        warn!(
            target = %target.name,
            fallback = self.fallback,
            "no MTU size got through, using fallback"
        );
        Ok(MtuSearch {
            choice: MtuChoice::DefaultFallback(self.fallback),
            samples,
        })
    }
}

pub(crate) fn validate_sizes(sizes: &[u16]) -> EngineResult<()> {
    if sizes.is_empty() {
        return Err(EngineError::invalid("MTU candidate list is empty"));
    }
    if let Some(&smallest) = sizes.last() {
        if smallest <= ECHO_HEADER_OVERHEAD {
            return Err(EngineError::invalid(format!(
                "MTU size {} does not exceed the {} byte echo header",
                smallest, ECHO_HEADER_OVERHEAD
            )));
        }
    }
    if sizes.windows(2).any(|w| w[0] <= w[1]) {
        return Err(EngineError::invalid(
            "MTU candidate sizes must be strictly descending",
        ));
    }
    Ok(())
}
