//! pathtune core - latency probing, ranking and traffic prioritisation
//!
//! Decides, from noisy and partially failing measurements, which resolver,
//! gateway and path MTU to use and how link bandwidth is split between
//! traffic classes.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐    ┌────────────────┐    ┌────────┐
//!  │ ProbeTransport├──▶│ ParallelProber ├───▶│ Ranker ├──▶ resolver / gateway
//!  └──────┬───────┘    └────────────────┘    └────────┘
//!         │            ┌────────────────┐
//!         └───────────▶│   MtuFinder    ├──────────────▶ path MTU
//!                      └────────────────┘
//!  ┌──────────────┐    ┌───────────────────┐
//!  │   Catalog    ├───▶│ TrafficClassifier ├──▶ allocate() ──▶ BandwidthPolicy
//!  └──────────────┘    └───────────────────┘
//!
//!  everything above ──▶ OptimizationPlan ──▶ Apply (platform specific)
//! ```
//!
//! The engine never talks to the operating system directly: measurements go
//! through a [`ProbeTransport`] and configuration changes through an
//! [`Apply`] implementation, both injected by the caller.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod classifier;
pub mod config;
pub mod error;
pub mod mtu;
pub mod optimizer;
pub mod plan;
pub mod probe;
pub mod prober;
pub mod ranker;
pub mod stats;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use allocator::{allocate, BandwidthPolicy, TierAllocation, TierWeights};
pub use classifier::{AppRole, AppRule, AppTable, Catalog, CatalogEntry, PortSet, PriorityTier, Protocol, TrafficClassifier};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use mtu::{MtuChoice, MtuFinder, MtuSample, MtuSearch};
pub use optimizer::Optimizer;
pub use plan::{Apply, GatewayChoice, OptimizationPlan, ResolverPair};
pub use probe::{ProbeMode, ProbeOutcome, ProbeResult, Prober};
pub use prober::ParallelProber;
pub use ranker::{rank, select_winner, RankedList, Selection};
pub use stats::LatencyStats;
pub use transport::{
    AttemptOutcome, FramedEchoOutcome, ProbeTransport, TcpTransport, DEFAULT_ECHO_PORT,
};

use serde::{Deserialize, Serialize};

/// A named endpoint evaluated during one probing round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Name, unique within a round
    pub name: String,
    /// Address handed to the transport (`host:port` for connect probes)
    pub address: String,
    /// Latency of the last probe, `None` when unreachable or not yet probed
    pub last_latency_ms: Option<f64>,
}

impl Candidate {
    /// Create an unprobed candidate
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            last_latency_ms: None,
        }
    }

    /// Whether the last probe reached the endpoint
    pub fn is_reachable(&self) -> bool {
        self.last_latency_ms.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_candidate_unprobed() {
        let c = Candidate::new("Cloudflare", "1.1.1.1:53");
        assert_eq!(c.name, "Cloudflare");
        assert!(!c.is_reachable());
    }
}
