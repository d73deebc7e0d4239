//! One optimisation round
//!
//! Ties the engine together: ranks resolvers and gateways, searches the path
//! MTU, resolves the configured applications and splits the link, then hands
//! the resulting [`OptimizationPlan`] to an [`Apply`] implementation.

use crate::{
    allocator::{allocate, BandwidthPolicy},
    classifier::{AppTable, Catalog, TrafficClassifier},
    config::EngineConfig,
    error::{EngineError, EngineResult},
    mtu::{MtuFinder, MtuSearch},
    plan::{Apply, GatewayChoice, OptimizationPlan, ResolverPair},
    probe::{ProbeMode, Prober},
    prober::ParallelProber,
    ranker::{rank, select_winner, Selection},
    transport::ProbeTransport,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Runs optimisation rounds against a validated configuration
pub struct Optimizer {
    config: EngineConfig,
    parallel: ParallelProber,
    mtu: MtuFinder,
    classifier: TrafficClassifier,
}

impl Optimizer {
    /// Create optimizer. Fails with `Config` when the configuration is invalid.
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn ProbeTransport>,
        catalog: Arc<Catalog>,
    ) -> EngineResult<Self> {
        config
            .validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        let prober = Prober::new(transport);
        Ok(Self {
            mtu: MtuFinder::new(prober.clone()).with_fallback(config.mtu.fallback),
            parallel: ParallelProber::new(prober),
            classifier: TrafficClassifier::new(catalog),
            config,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Classifier over the shared catalog
    pub fn classifier(&self) -> &TrafficClassifier {
        &self.classifier
    }

    /// Time a TCP connect to each provider's primary and pick the fastest
    pub async fn fastest_resolvers(&self) -> EngineResult<Option<ResolverPair>> {
        let results = self
            .parallel
            .probe_all(
                &self.config.dns_candidates(),
                ProbeMode::Connect,
                self.config.probe_timeout(),
                self.config.round_deadline(),
            )
            .await?;

        let winner = match select_winner(&rank(results)) {
            Selection::Winner(c) => c,
            Selection::NoneAvailable => {
                warn!("no resolver reachable, keeping current DNS");
                return Ok(None);
            }
        };

        Ok(self.config.provider(&winner.name).map(|p| ResolverPair {
            provider: p.name.clone(),
            primary: p.primary.clone(),
            secondary: p.secondary.clone(),
            latency_ms: winner.last_latency_ms.unwrap_or_default(),
        }))
    }

    /// Echo every route target, pick the fastest and sample it for statistics
    pub async fn best_gateway(&self) -> EngineResult<Option<GatewayChoice>> {
        let timeout = self.config.probe_timeout();
        let results = self
            .parallel
            .probe_all(
                &self.config.route_candidates(),
                ProbeMode::Echo,
                timeout,
                self.config.round_deadline(),
            )
            .await?;

        let winner = match select_winner(&rank(results)) {
            Selection::Winner(c) => c,
            Selection::NoneAvailable => {
                warn!("no route target reachable, keeping current gateway");
                return Ok(None);
            }
        };

        let stats = self
            .parallel
            .prober()
            .sample(&winner, ProbeMode::Echo, timeout, self.config.probe.samples)
            .await?;
        info!(
            gateway = %winner.name,
            avg_ms = stats.avg_ms.unwrap_or_default(),
            loss_percent = stats.loss_percent,
            "gateway sampled"
        );

        Ok(Some(GatewayChoice {
            latency_ms: winner.last_latency_ms.unwrap_or_default(),
            name: winner.name,
            address: winner.address,
            stats: Some(stats),
        }))
    }

    /// Largest configured MTU that reaches the MTU target unfragmented
    pub async fn discover_mtu(&self) -> EngineResult<MtuSearch> {
        self.mtu
            .find_max_mtu(
                &self.config.mtu_candidate(),
                &self.config.mtu.sizes,
                self.config.mtu_timeout(),
            )
            .await
    }

    /// Bandwidth split and the resolved application table
    pub fn traffic_policy(&self) -> EngineResult<(BandwidthPolicy, AppTable)> {
        let qos = &self.config.qos;
        let policy = allocate(qos.link_capacity_mbit, &qos.weights)?;
        let table = self.classifier.resolve(&qos.applications);
        if !table.unknown.is_empty() {
            warn!(unknown = ?table.unknown, "applications missing from catalog");
        }
        Ok((policy, table))
    }

    /// Run one full round
    pub async fn run(&self) -> EngineResult<OptimizationPlan> {
        info!("starting optimisation round");

        // independent of each other, so probe them together
        let (resolvers, gateway, mtu) = tokio::join!(
            self.fastest_resolvers(),
            self.best_gateway(),
            self.discover_mtu()
        );
        let (bandwidth, table) = self.traffic_policy()?;

        let plan = OptimizationPlan {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            resolvers: resolvers?,
            gateway: gateway?,
            mtu: mtu?.choice,
            bandwidth,
            applications: table.rules,
            unknown_applications: table.unknown,
        };

        info!(
            plan = %plan.id,
            resolver = plan.resolvers.as_ref().map(|r| r.provider.as_str()).unwrap_or("-"),
            gateway = plan.gateway.as_ref().map(|g| g.name.as_str()).unwrap_or("-"),
            mtu = plan.mtu.size(),
            applications = plan.applications.len(),
            "optimisation round finished"
        );
        Ok(plan)
    }

    /// Run one round and apply the plan
    pub async fn run_and_apply(&self, applier: &dyn Apply) -> EngineResult<OptimizationPlan> {
        let plan = self.run().await?;
        info!(plan = %plan.id, platform = applier.platform(), "applying plan");
        applier.apply(&plan).await?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::PriorityTier;
    use crate::config::{ResolverProvider, RouteTarget};
    use crate::mtu::MtuChoice;
    use crate::testing::ScriptedTransport;
    use crate::transport::FramedEchoOutcome;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.dns.providers = vec![
            ResolverProvider::new("Cloudflare", "1.1.1.1", "1.0.0.1"),
            ResolverProvider::new("Google", "8.8.8.8", "8.8.4.4"),
            ResolverProvider::new("Quad9", "9.9.9.9", "149.112.112.112"),
        ];
        config.routes.targets = vec![
            RouteTarget::new("Steam", "208.78.164.9"),
            RouteTarget::new("Discord", "162.159.130.233"),
        ];
        config.mtu.target = "8.8.8.8".into();
        config.mtu.sizes = vec![1500, 1472, 1400];
        config.probe.samples = 3;
        config.qos.applications = vec!["Zoom".into(), "Valorant".into(), "Solitaire".into()];
        config
    }

    fn optimizer(transport: ScriptedTransport, config: EngineConfig) -> Optimizer {
        Optimizer::new(
            config,
            Arc::new(transport),
            Arc::new(Catalog::builtin().unwrap()),
        )
        .unwrap()
    }

    fn healthy() -> ScriptedTransport {
        ScriptedTransport::new()
            .reach("1.1.1.1:53", 30)
            .reach("8.8.8.8:53", 12)
            .refuse("9.9.9.9:53")
            .reach("208.78.164.9", 40)
            .reach("162.159.130.233", 25)
            .frame(1472 - 28, FramedEchoOutcome::Acked { rtt: None })
    }

    #[derive(Default)]
    struct RecordingApplier {
        applied: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl Apply for RecordingApplier {
        fn platform(&self) -> &'static str {
            "recording"
        }

        async fn apply(&self, plan: &OptimizationPlan) -> EngineResult<()> {
            self.applied.lock().push(plan.id);
            Ok(())
        }
    }

    struct FailingApplier;

    #[async_trait]
    impl Apply for FailingApplier {
        fn platform(&self) -> &'static str {
            "failing"
        }

        async fn apply(&self, _plan: &OptimizationPlan) -> EngineResult<()> {
            Err(EngineError::Apply("permission denied".into()))
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut bad = config();
        bad.routes.targets.clear();
        let result = Optimizer::new(
            bad,
            Arc::new(ScriptedTransport::new()),
            Arc::new(Catalog::builtin().unwrap()),
        );
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fastest_resolver_pair() {
        let opt = optimizer(healthy(), config());
        let pair = opt.fastest_resolvers().await.unwrap().unwrap();

        assert_eq!(pair.provider, "Google");
        assert_eq!(pair.primary, "8.8.8.8");
        assert_eq!(pair.secondary, "8.8.4.4");
        assert!(pair.latency_ms >= 12.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_gateway_is_sampled() {
        let opt = optimizer(healthy(), config());
        let gateway = opt.best_gateway().await.unwrap().unwrap();

        assert_eq!(gateway.name, "Discord");
        let stats = gateway.stats.unwrap();
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.successes, 3);
        assert_eq!(stats.loss_percent, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_round_builds_plan() {
        let opt = optimizer(healthy(), config());
        let applier = RecordingApplier::default();

        let plan = opt.run_and_apply(&applier).await.unwrap();

        assert_eq!(applier.applied.lock().as_slice(), &[plan.id]);
        assert_eq!(plan.resolvers.as_ref().unwrap().provider, "Google");
        assert_eq!(plan.gateway.as_ref().unwrap().name, "Discord");
        assert_eq!(plan.mtu, MtuChoice::Discovered(1472));
        assert!(plan.has_network_changes());

        let apps: Vec<_> = plan.applications.iter().map(|r| (r.application.as_str(), r.tier)).collect();
        assert_eq!(
            apps,
            vec![("Valorant", PriorityTier::Realtime), ("Zoom", PriorityTier::Interactive)]
        );
        assert_eq!(plan.unknown_applications, vec!["Solitaire".to_string()]);
        assert_eq!(plan.bandwidth.link_capacity, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_network_keeps_current_settings() {
        let transport = ScriptedTransport::new()
            .refuse("1.1.1.1:53")
            .unreachable("8.8.8.8:53")
            .hang("208.78.164.9");
        let opt = optimizer(transport, config());

        let plan = opt.run().await.unwrap();

        assert!(plan.resolvers.is_none());
        assert!(plan.gateway.is_none());
        assert!(!plan.has_network_changes());
        assert_eq!(plan.mtu, MtuChoice::DefaultFallback(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_failure_propagates() {
        let opt = optimizer(healthy(), config());
        let err = opt.run_and_apply(&FailingApplier).await.unwrap_err();
        assert!(matches!(err, EngineError::Apply(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_plan_serializes() {
        let opt = optimizer(healthy(), config());
        let plan = opt.run().await.unwrap();

        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["mtu"]["kind"], "discovered");
        assert_eq!(json["mtu"]["size"], 1472);
        assert_eq!(json["resolvers"]["provider"], "Google");
    }
}
