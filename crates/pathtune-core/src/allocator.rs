//! Three-tier bandwidth allocation
//!
//! Turns relative tier weights into a guaranteed rate and a ceiling per tier,
//! expressed as fractions of the link. Guarantees are the normalised weights,
//! so they never sum past the link. Ceilings let a tier borrow idle capacity:
//! Realtime may use the whole link, the others stop short of it.

use crate::{
    classifier::PriorityTier,
    error::{EngineError, EngineResult},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Weights used when every configured weight is zero
pub const DEFAULT_WEIGHTS: TierWeights = TierWeights {
    realtime: 0.8,
    interactive: 0.6,
    best_effort: 0.3,
};

/// Relative bandwidth weight per tier, each ≥ 0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierWeights {
    /// Realtime weight
    pub realtime: f64,
    /// Interactive weight
    pub interactive: f64,
    /// Best-effort weight
    pub best_effort: f64,
}

impl TierWeights {
    /// Create weights
    pub const fn new(realtime: f64, interactive: f64, best_effort: f64) -> Self {
        Self {
            realtime,
            interactive,
            best_effort,
        }
    }

    /// Weight of one tier
    pub const fn get(&self, tier: PriorityTier) -> f64 {
        match tier {
            PriorityTier::Realtime => self.realtime,
            PriorityTier::Interactive => self.interactive,
            PriorityTier::BestEffort => self.best_effort,
        }
    }

    /// Sum of all weights
    pub fn total(&self) -> f64 {
        self.realtime + self.interactive + self.best_effort
    }
}

impl Default for TierWeights {
    fn default() -> Self {
        DEFAULT_WEIGHTS
    }
}

/// Guarantee and ceiling for one tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierAllocation {
    /// Tier
    pub tier: PriorityTier,
    /// Share of the link always available to the tier, 0.0 - 1.0
    pub guaranteed_fraction: f64,
    /// Share of the link the tier may borrow up to, 0.0 - 1.0
    pub ceiling_fraction: f64,
}

/// Bandwidth policy for a link; pure data, enforced by the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthPolicy {
    /// Link capacity, in the caller's unit (Mbit/s by convention)
    pub link_capacity: f64,
    /// One allocation per tier, highest priority first
    pub tiers: [TierAllocation; 3],
    /// Tier for traffic no rule matches
    pub default_tier: PriorityTier,
}

impl BandwidthPolicy {
    /// Allocation of one tier
    pub fn get(&self, tier: PriorityTier) -> &TierAllocation {
        // tiers is built in PriorityTier::ALL order
        match tier {
            PriorityTier::Realtime => &self.tiers[0],
            PriorityTier::Interactive => &self.tiers[1],
            PriorityTier::BestEffort => &self.tiers[2],
        }
    }

    /// Guaranteed rate of a tier in link units
    pub fn guaranteed_rate(&self, tier: PriorityTier) -> f64 {
        self.get(tier).guaranteed_fraction * self.link_capacity
    }

    /// Ceiling rate of a tier in link units
    pub fn ceiling_rate(&self, tier: PriorityTier) -> f64 {
        self.get(tier).ceiling_fraction * self.link_capacity
    }

    /// Sum of guaranteed fractions
    pub fn total_guaranteed(&self) -> f64 {
        self.tiers.iter().map(|t| t.guaranteed_fraction).sum()
    }
}

/// Default ceiling of a tier as a share of the link
const fn base_ceiling(tier: PriorityTier) -> f64 {
    match tier {
        PriorityTier::Realtime => 1.0,
        PriorityTier::Interactive => 0.9,
        PriorityTier::BestEffort => 0.8,
    }
}

/// Build a policy for `link_capacity` from tier weights.
///
/// A weight of zero means no guarantee; the tier still gets its ceiling.
/// When every weight is zero, [`DEFAULT_WEIGHTS`] are normalised instead.
pub fn allocate(link_capacity: f64, weights: &TierWeights) -> EngineResult<BandwidthPolicy> {
    if !link_capacity.is_finite() || link_capacity <= 0.0 {
        return Err(EngineError::invalid(format!(
            "link capacity must be positive, got {}",
            link_capacity
        )));
    }
    for tier in PriorityTier::ALL {
        let w = weights.get(tier);
        if !w.is_finite() || w < 0.0 {
            return Err(EngineError::invalid(format!(
                "weight for {} must be a non-negative number, got {}",
                tier.as_str(),
                w
            )));
        }
    }

    let effective = if weights.total() > 0.0 {
        *weights
    } else {
        info!("all tier weights are zero, using default split");
        DEFAULT_WEIGHTS
    };

    // scale by the largest weight so huge finite weights cannot sum to inf
    let largest = PriorityTier::ALL
        .iter()
        .map(|&t| effective.get(t))
        .fold(0.0, f64::max);
    let scaled = PriorityTier::ALL.map(|t| effective.get(t) / largest);
    let total: f64 = scaled.iter().sum();

    let mut guaranteed = scaled.map(|w| w / total);
    cap_guarantees(&mut guaranteed);

    let tiers = std::array::from_fn(|i| {
        let tier = PriorityTier::ALL[i];
        let guaranteed_fraction = guaranteed[i];
        let ceiling_fraction = base_ceiling(tier).max(guaranteed_fraction).min(1.0);
        TierAllocation {
            tier,
            guaranteed_fraction,
            ceiling_fraction,
        }
    });

    let policy = BandwidthPolicy {
        link_capacity,
        tiers,
        default_tier: PriorityTier::BestEffort,
    };

    for t in &policy.tiers {
        debug!(
            tier = t.tier.as_str(),
            rate = policy.guaranteed_rate(t.tier),
            ceil = policy.ceiling_rate(t.tier),
            "tier allocation"
        );
    }

    Ok(policy)
}

/// Trim rounding excess off the largest guarantee so the sum stays within 1.0.
///
/// Sums in tier order, the same way [`BandwidthPolicy::total_guaranteed`] does.
fn cap_guarantees(guaranteed: &mut [f64; 3]) {
    let sum = |g: &[f64; 3]| g.iter().sum::<f64>();
    if sum(guaranteed) <= 1.0 {
        return;
    }

    let mut largest = 0;
    for i in 1..guaranteed.len() {
        if guaranteed[i] > guaranteed[largest] {
            largest = i;
        }
    }
    let others: f64 = (0..guaranteed.len())
        .filter(|&i| i != largest)
        .map(|i| guaranteed[i])
        .sum();
    guaranteed[largest] = (1.0 - others).max(0.0);

    // 1.0 - others can itself round up; step down one ulp at a time
    while sum(guaranteed) > 1.0 && guaranteed[largest] > 0.0 {
        guaranteed[largest] = f64::from_bits(guaranteed[largest].to_bits() - 1);
    }
}
