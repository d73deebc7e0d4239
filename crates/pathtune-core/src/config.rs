//! Engine configuration

use crate::{
    allocator::{allocate, TierWeights},
    error::{EngineError, EngineResult},
    mtu::{validate_sizes, DEFAULT_FALLBACK_MTU, DEFAULT_MTU_SIZES},
    probe::ECHO_HEADER_OVERHEAD,
    Candidate,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Probe timing
    #[serde(default)]
    pub probe: ProbeSettings,
    /// Resolver selection
    #[serde(default)]
    pub dns: DnsSettings,
    /// Gateway selection
    #[serde(default)]
    pub routes: RouteSettings,
    /// Path MTU discovery
    #[serde(default)]
    pub mtu: MtuSettings,
    /// Traffic prioritisation
    #[serde(default)]
    pub qos: QosSettings,
}

impl EngineConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every section, failing on the first problem
    pub fn validate(&self) -> EngineResult<()> {
        if self.probe.timeout_ms == 0 {
            return Err(EngineError::invalid("probe.timeout_ms must be positive"));
        }
        if self.probe.deadline_ms == 0 {
            return Err(EngineError::invalid("probe.deadline_ms must be positive"));
        }
        if self.probe.samples == 0 {
            return Err(EngineError::invalid("probe.samples must be at least 1"));
        }

        if self.dns.providers.is_empty() {
            return Err(EngineError::invalid("dns.providers is empty"));
        }
        unique_names("dns.providers", self.dns.providers.iter().map(|p| p.name.as_str()))?;
        if self.dns.port == 0 {
            return Err(EngineError::invalid("dns.port must be non-zero"));
        }

        if self.routes.targets.is_empty() {
            return Err(EngineError::invalid("routes.targets is empty"));
        }
        unique_names("routes.targets", self.routes.targets.iter().map(|t| t.name.as_str()))?;

        if self.mtu.target.is_empty() {
            return Err(EngineError::invalid("mtu.target is empty"));
        }
        if self.mtu.timeout_ms == 0 {
            return Err(EngineError::invalid("mtu.timeout_ms must be positive"));
        }
        validate_sizes(&self.mtu.sizes)?;
        if self.mtu.fallback <= ECHO_HEADER_OVERHEAD {
            return Err(EngineError::invalid(format!(
                "mtu.fallback {} does not exceed the {} byte echo header",
                self.mtu.fallback, ECHO_HEADER_OVERHEAD
            )));
        }

        allocate(self.qos.link_capacity_mbit, &self.qos.weights)?;
        Ok(())
    }

    /// Per-probe timeout
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe.timeout_ms)
    }

    /// Deadline for one probing round
    pub fn round_deadline(&self) -> Duration {
        Duration::from_millis(self.probe.deadline_ms)
    }

    /// Timeout for one MTU probe
    pub fn mtu_timeout(&self) -> Duration {
        Duration::from_millis(self.mtu.timeout_ms)
    }

    /// One connect candidate per provider, addressed at its primary resolver
    pub fn dns_candidates(&self) -> Vec<Candidate> {
        self.dns
            .providers
            .iter()
            .map(|p| Candidate::new(p.name.clone(), host_port(&p.primary, self.dns.port)))
            .collect()
    }

    /// One echo candidate per route target
    pub fn route_candidates(&self) -> Vec<Candidate> {
        self.routes
            .targets
            .iter()
            .map(|t| Candidate::new(t.name.clone(), t.host.clone()))
            .collect()
    }

    /// Echo candidate for MTU discovery
    pub fn mtu_candidate(&self) -> Candidate {
        Candidate::new("mtu-target", self.mtu.target.clone())
    }

    /// Provider by name
    pub fn provider(&self, name: &str) -> Option<&ResolverProvider> {
        self.dns.providers.iter().find(|p| p.name == name)
    }
}

fn host_port(host: &str, port: u16) -> String {
    match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port).to_string(),
        Err(_) => format!("{}:{}", host, port),
    }
}

fn unique_names<'a>(section: &str, names: impl Iterator<Item = &'a str>) -> EngineResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.is_empty() {
            return Err(EngineError::invalid(format!("{} has an unnamed entry", section)));
        }
        if !seen.insert(name) {
            return Err(EngineError::invalid(format!("{} has duplicate name {}", section, name)));
        }
    }
    Ok(())
}

/// Probe timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Per-probe timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Round deadline in milliseconds
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    /// Probes taken against the chosen gateway for its statistics
    #[serde(default = "default_samples")]
    pub samples: u32,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            deadline_ms: default_deadline_ms(),
            samples: default_samples(),
        }
    }
}

/// Resolver selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsSettings {
    /// Providers to compare
    #[serde(default = "default_providers")]
    pub providers: Vec<ResolverProvider>,
    /// Port probed on each primary
    #[serde(default = "default_dns_port")]
    pub port: u16,
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            port: default_dns_port(),
        }
    }
}

/// Public resolver provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverProvider {
    /// Provider name
    pub name: String,
    /// Primary resolver address
    pub primary: String,
    /// Secondary resolver address
    pub secondary: String,
}

impl ResolverProvider {
    /// Create provider
    pub fn new(
        name: impl Into<String>,
        primary: impl Into<String>,
        secondary: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }
}

/// Gateway selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSettings {
    /// Targets to compare
    #[serde(default = "default_route_targets")]
    pub targets: Vec<RouteTarget>,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            targets: default_route_targets(),
        }
    }
}

/// Named gateway or game server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTarget {
    /// Display name
    pub name: String,
    /// Host or IP address
    pub host: String,
}

impl RouteTarget {
    /// Create target
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
        }
    }
}

/// Path MTU discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtuSettings {
    /// Host probed with DF echoes
    #[serde(default = "default_mtu_target")]
    pub target: String,
    /// Sizes to try, strictly descending
    #[serde(default = "default_mtu_sizes")]
    pub sizes: Vec<u16>,
    /// Size reported when none gets through
    #[serde(default = "default_fallback_mtu")]
    pub fallback: u16,
    /// Timeout per size in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for MtuSettings {
    fn default() -> Self {
        Self {
            target: default_mtu_target(),
            sizes: default_mtu_sizes(),
            fallback: default_fallback_mtu(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Traffic prioritisation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QosSettings {
    /// Link capacity in Mbit/s
    #[serde(default = "default_link_capacity")]
    pub link_capacity_mbit: f64,
    /// Tier weights
    #[serde(default)]
    pub weights: TierWeights,
    /// Applications to prioritise, by catalog name
    #[serde(default)]
    pub applications: Vec<String>,
    /// Catalog file replacing the built-in one
    #[serde(default)]
    pub catalog_path: Option<String>,
}

impl Default for QosSettings {
    fn default() -> Self {
        Self {
            link_capacity_mbit: default_link_capacity(),
            weights: TierWeights::default(),
            applications: Vec::new(),
            catalog_path: None,
        }
    }
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_deadline_ms() -> u64 {
    5000
}

fn default_samples() -> u32 {
    5
}

fn default_dns_port() -> u16 {
    53
}

fn default_providers() -> Vec<ResolverProvider> {
    vec![
        ResolverProvider::new("Cloudflare", "1.1.1.1", "1.0.0.1"),
        ResolverProvider::new("Google", "8.8.8.8", "8.8.4.4"),
        ResolverProvider::new("Quad9", "9.9.9.9", "149.112.112.112"),
        ResolverProvider::new("OpenDNS", "208.67.222.222", "208.67.220.220"),
        ResolverProvider::new("AdGuard", "94.140.14.14", "94.140.15.15"),
    ]
}

fn default_route_targets() -> Vec<RouteTarget> {
    vec![
        RouteTarget::new("Google", "8.8.8.8"),
        RouteTarget::new("Cloudflare", "1.1.1.1"),
        RouteTarget::new("AWS US-East", "3.216.34.172"),
        RouteTarget::new("AWS EU-West", "54.170.162.7"),
        RouteTarget::new("Steam", "208.78.164.9"),
        RouteTarget::new("Discord", "162.159.130.233"),
        RouteTarget::new("Riot Games", "104.160.131.3"),
        RouteTarget::new("Blizzard", "24.105.30.129"),
    ]
}

fn default_mtu_target() -> String {
    "8.8.8.8".into()
}

fn default_mtu_sizes() -> Vec<u16> {
    DEFAULT_MTU_SIZES.to_vec()
}

fn default_fallback_mtu() -> u16 {
    DEFAULT_FALLBACK_MTU
}

fn default_link_capacity() -> f64 {
    100.0
}
