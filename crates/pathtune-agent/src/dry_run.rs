//! Applier that changes nothing

use async_trait::async_trait;
use pathtune_core::{Apply, EngineResult, OptimizationPlan, PriorityTier};
use tracing::info;

/// Logs the plan and prints it as JSON instead of touching the host
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunApplier;

impl DryRunApplier {
    /// Create applier
    pub fn new() -> Self {
        Self
    }

    /// Plan as pretty JSON
    pub fn render(&self, plan: &OptimizationPlan) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(plan)?)
    }
}

#[async_trait]
impl Apply for DryRunApplier {
    fn platform(&self) -> &'static str {
        "dry-run"
    }

    async fn apply(&self, plan: &OptimizationPlan) -> EngineResult<()> {
        match &plan.resolvers {
            Some(pair) => info!(
                provider = %pair.provider,
                primary = %pair.primary,
                secondary = %pair.secondary,
                "would set DNS"
            ),
            None => info!("would keep current DNS"),
        }
        match &plan.gateway {
            Some(gw) => info!(gateway = %gw.name, address = %gw.address, "would prefer route"),
            None => info!("would keep current route"),
        }
        info!(mtu = plan.mtu.size(), discovered = plan.mtu.is_discovered(), "would set MTU");

        for tier in PriorityTier::ALL {
            let alloc = plan.bandwidth.get(tier);
            info!(
                tier = tier.as_str(),
                class = tier.class_minor(),
                prio = tier.class_priority(),
                rate = plan.bandwidth.guaranteed_rate(tier),
                ceil = plan.bandwidth.ceiling_rate(tier),
                guaranteed = alloc.guaranteed_fraction,
                "would create class"
            );
        }
        for rule in &plan.applications {
            info!(
                application = %rule.application,
                tier = rule.tier.as_str(),
                ports = ?rule.ports.ports,
                "would prioritise"
            );
        }

        println!("{}", self.render(plan)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathtune_core::{allocate, AppRule, MtuChoice, PortSet, Protocol, ResolverPair, TierWeights};

    fn plan() -> OptimizationPlan {
        OptimizationPlan {
            id: uuid::Uuid::new_v4(),
            generated_at: chrono::Utc::now(),
            resolvers: Some(ResolverPair {
                provider: "Cloudflare".into(),
                primary: "1.1.1.1".into(),
                secondary: "1.0.0.1".into(),
                latency_ms: 8.5,
            }),
            gateway: None,
            mtu: MtuChoice::DefaultFallback(1500),
            bandwidth: allocate(100.0, &TierWeights::default()).unwrap(),
            applications: vec![AppRule {
                application: "Minecraft".into(),
                tier: PriorityTier::Realtime,
                ports: PortSet {
                    application_name: "Minecraft".into(),
                    ports: [25565].into_iter().collect(),
                    protocol: Protocol::Both,
                },
            }],
            unknown_applications: vec!["Tetris".into()],
        }
    }

    #[test]
    fn test_render_is_pretty_json() {
        let plan = plan();
        let json = DryRunApplier::new().render(&plan).unwrap();

        assert!(json.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["resolvers"]["primary"], "1.1.1.1");
        assert!(value["gateway"].is_null());
        assert_eq!(value["mtu"]["kind"], "default_fallback");
        assert_eq!(value["applications"][0]["tier"], "realtime");
    }

    #[test]
    fn test_apply_succeeds() {
        let applier = DryRunApplier::new();
        assert_eq!(applier.platform(), "dry-run");
        tokio_test::block_on(applier.apply(&plan())).unwrap();
    }
}
