//! Optimisation plan and the platform seam that applies it

use crate::{
    allocator::BandwidthPolicy,
    classifier::AppRule,
    error::EngineResult,
    mtu::MtuChoice,
    stats::LatencyStats,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Resolver pair of the winning provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverPair {
    /// Provider name
    pub provider: String,
    /// Primary resolver
    pub primary: String,
    /// Secondary resolver
    pub secondary: String,
    /// Connect latency of the primary
    pub latency_ms: f64,
}

/// Chosen gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayChoice {
    /// Target name
    pub name: String,
    /// Target address
    pub address: String,
    /// Latency in the ranking round
    pub latency_ms: f64,
    /// Follow-up samples, when any were taken
    pub stats: Option<LatencyStats>,
}

/// Everything one optimisation round decided.
///
/// `None` for resolvers or gateway means nothing was reachable and the
/// current configuration should stay as it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationPlan {
    /// Plan ID
    pub id: Uuid,
    /// When the round finished
    pub generated_at: DateTime<Utc>,
    /// Fastest resolver pair
    pub resolvers: Option<ResolverPair>,
    /// Fastest gateway
    pub gateway: Option<GatewayChoice>,
    /// Path MTU
    pub mtu: MtuChoice,
    /// Bandwidth split
    pub bandwidth: BandwidthPolicy,
    /// Prioritised applications, highest tier first
    pub applications: Vec<AppRule>,
    /// Requested applications missing from the catalog
    pub unknown_applications: Vec<String>,
}

impl OptimizationPlan {
    /// Whether the plan would change anything beyond MTU and bandwidth
    pub fn has_network_changes(&self) -> bool {
        self.resolvers.is_some() || self.gateway.is_some()
    }
}

/// Applies a plan to the host. Implemented per platform.
#[async_trait]
pub trait Apply: Send + Sync {
    /// Platform name
    fn platform(&self) -> &'static str;

    /// Apply the plan
    async fn apply(&self, plan: &OptimizationPlan) -> EngineResult<()>;
}
