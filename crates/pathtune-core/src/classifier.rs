//! Application classification
//!
//! The catalog maps application names to the ports they use and to a role
//! (gaming, streaming). It is plain configuration data, JSON shaped like:
//!
//! ```json
//! { "applications": [
//!     { "name": "Minecraft", "role": "gaming", "ports": [25565], "protocol": "both" }
//! ] }
//! ```
//!
//! `protocol` defaults to `both`. Names are matched exactly, case included.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, trace};

const BUILTIN_CATALOG: &str = include_str!("../catalog/applications.json");

/// Transport protocol hint for a port set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP only
    Tcp,
    /// UDP only
    Udp,
    /// TCP and UDP
    #[default]
    Both,
}

/// Catalog role of an application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppRole {
    /// Real-time game traffic
    Gaming,
    /// Live streaming, voice and video calls
    Streaming,
    /// Everything else
    #[default]
    Unclassified,
}

/// Traffic priority tier, `Realtime > Interactive > BestEffort`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    /// Bulk and background traffic
    BestEffort,
    /// Streaming and calls
    Interactive,
    /// Games
    Realtime,
}

impl PriorityTier {
    /// All tiers, highest priority first
    pub const ALL: [PriorityTier; 3] = [Self::Realtime, Self::Interactive, Self::BestEffort];

    /// Tier for a catalog role
    pub const fn for_role(role: AppRole) -> Self {
        match role {
            AppRole::Gaming => Self::Realtime,
            AppRole::Streaming => Self::Interactive,
            AppRole::Unclassified => Self::BestEffort,
        }
    }

    /// Scheduling priority of the tier's traffic class, 0 is served first
    pub const fn class_priority(&self) -> u8 {
        match self {
            Self::Realtime => 0,
            Self::Interactive => 1,
            Self::BestEffort => 2,
        }
    }

    /// Minor id of the tier's class under the root of a class hierarchy
    pub const fn class_minor(&self) -> u16 {
        match self {
            Self::Realtime => 10,
            Self::Interactive => 20,
            Self::BestEffort => 30,
        }
    }

    /// Stable lowercase name
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Realtime => "realtime",
            Self::Interactive => "interactive",
            Self::BestEffort => "best_effort",
        }
    }
}

/// Ports used by one application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSet {
    /// Application name
    pub application_name: String,
    /// Ports, each in 1..=65535
    pub ports: BTreeSet<u16>,
    /// Protocol hint
    pub protocol: Protocol,
}

/// Catalog entry as stored in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Application name, exact match
    pub name: String,
    /// Role
    #[serde(default)]
    pub role: AppRole,
    /// Ports
    pub ports: Vec<u16>,
    /// Protocol hint
    #[serde(default)]
    pub protocol: Protocol,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    applications: Vec<CatalogEntry>,
}

/// Read-only application catalog
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Build from entries, rejecting duplicates and invalid ports
    pub fn from_entries(entries: Vec<CatalogEntry>) -> EngineResult<Self> {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if entry.name.is_empty() {
                return Err(EngineError::Catalog("application with empty name".into()));
            }
            if entry.ports.is_empty() {
                return Err(EngineError::Catalog(format!("{} lists no ports", entry.name)));
            }
            if entry.ports.contains(&0) {
                return Err(EngineError::Catalog(format!("{} lists port 0", entry.name)));
            }
            if index.insert(entry.name.clone(), i).is_some() {
                return Err(EngineError::Catalog(format!(
                    "duplicate application: {}",
                    entry.name
                )));
            }
        }
        Ok(Self { entries, index })
    }

    /// Parse the JSON catalog format
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::from_entries(file.applications)
    }

    /// Load a JSON catalog from disk
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&content)?;
        info!(path = %path.display(), applications = catalog.len(), "loaded application catalog");
        Ok(catalog)
    }

    /// Catalog shipped with the crate
    pub fn builtin() -> EngineResult<Self> {
        Self::from_json(BUILTIN_CATALOG)
    }

    /// Look up an entry by exact name
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Entries in file order
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Entries with a given role
    pub fn with_role(&self, role: AppRole) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(move |e| e.role == role)
    }

    /// Number of applications
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Application resolved to its tier and ports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRule {
    /// Application name
    pub application: String,
    /// Assigned tier
    pub tier: PriorityTier,
    /// Ports to match
    pub ports: PortSet,
}

/// Resolved application table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppTable {
    /// Known applications, highest tier first, request order within a tier
    pub rules: Vec<AppRule>,
    /// Requested names missing from the catalog
    pub unknown: Vec<String>,
}

impl AppTable {
    /// Rules for one tier
    pub fn tier(&self, tier: PriorityTier) -> impl Iterator<Item = &AppRule> {
        self.rules.iter().filter(move |r| r.tier == tier)
    }
}

/// Maps applications to ports and tiers
#[derive(Debug, Clone)]
pub struct TrafficClassifier {
    catalog: Arc<Catalog>,
}

impl TrafficClassifier {
    /// Create over a shared catalog
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Shared catalog
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Ports of an application, `None` when it is not in the catalog
    pub fn classify(&self, application: &str) -> Option<PortSet> {
        self.catalog.get(application).map(|entry| PortSet {
            application_name: entry.name.clone(),
            ports: entry.ports.iter().copied().collect(),
            protocol: entry.protocol,
        })
    }

    /// Catalog role of an application, `Unclassified` when unknown
    pub fn role_of(&self, application: &str) -> AppRole {
        self.catalog
            .get(application)
            .map(|e| e.role)
            .unwrap_or(AppRole::Unclassified)
    }

    /// Tier for an application with the given role
    pub fn assign_tier(&self, application: &str, role: AppRole) -> PriorityTier {
        let tier = PriorityTier::for_role(role);
        trace!(application, ?role, ?tier, "assigned tier");
        tier
    }

    /// Resolve a list of application names into rules
    pub fn resolve(&self, applications: &[String]) -> AppTable {
        let mut table = AppTable::default();
        for name in applications {
            if table.rules.iter().any(|r| &r.application == name) || table.unknown.contains(name) {
                continue;
            }
            match self.classify(name) {
                Some(ports) => {
                    let tier = self.assign_tier(name, self.role_of(name));
                    table.rules.push(AppRule {
                        application: name.clone(),
                        tier,
                        ports,
                    });
                }
                None => table.unknown.push(name.clone()),
            }
        }
        // stable, so request order survives within a tier
        table.rules.sort_by(|a, b| b.tier.cmp(&a.tier));
        table
    }
}
