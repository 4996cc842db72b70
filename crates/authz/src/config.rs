/// Top-level configuration, composed the way `ciam-api::config::Config`
/// composes `DatabaseConfig`/`CacheConfig`: one flat struct an embedder
/// builds once at startup and threads through to each layer's constructor.
#[derive(Debug, Clone)]
pub struct NexusConfig {
    pub store: nexus_store::StoreConfig,
    pub l1: nexus_cache::L1Config,
    pub engine: EngineConfig,
    /// Capacity of the L2 Tiger Cache's subject-set table (distinct from
    /// `l1.l1_capacity`, which bounds the decision cache).
    pub l2_capacity: u64,
}

impl Default for NexusConfig {
    fn default() -> Self {
        Self {
            store: nexus_store::StoreConfig::default(),
            l1: nexus_cache::L1Config::default(),
            engine: EngineConfig::default(),
            l2_capacity: 1_000_000,
        }
    }
}

impl NexusConfig {
    pub fn from_env() -> Self {
        Self {
            store: nexus_store::StoreConfig::from_env(),
            l1: nexus_cache::L1Config::from_env(),
            engine: EngineConfig::from_env(),
            l2_capacity: std::env::var("NEXUS_L2_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1_000_000),
        }
    }
}

/// Engine-level toggles from spec.md §6. Composed into [`NexusConfig`]
/// alongside `nexus_store::StoreConfig` and `nexus_cache::L1Config`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Global bypass for bootstrap: when `false`, every check is allowed
    /// without consulting the store. Exists so an empty, freshly-deployed
    /// zone can be populated before permission enforcement is turned on.
    pub enforce_permissions: bool,
    /// When `false`, a check may read tuples from a zone other than the
    /// one named in the request. Defaults to `true`; disabling this is a
    /// deliberate per-deployment choice, never a per-request one.
    pub enforce_zone_isolation: bool,
    /// Deny-wins-over-allow, per spec.md §3/§4.5. Disabling is unsupported
    /// in production and exists only so tests can exercise the
    /// deny-precedence invariant's absence.
    pub deny_precedence: bool,
    /// Whether the Write-Through Coordinator consults and populates L2 at
    /// all. With this off, every check falls through to tuple traversal.
    pub l2_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enforce_permissions: true,
            enforce_zone_isolation: true,
            deny_precedence: true,
            l2_enabled: true,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            enforce_permissions: bool_env("NEXUS_ENFORCE_PERMISSIONS", default.enforce_permissions),
            enforce_zone_isolation: bool_env(
                "NEXUS_ENFORCE_ZONE_ISOLATION",
                default.enforce_zone_isolation,
            ),
            deny_precedence: bool_env("NEXUS_DENY_PRECEDENCE", default.deny_precedence),
            l2_enabled: bool_env("NEXUS_L2_ENABLED", default.l2_enabled),
        }
    }
}

fn bool_env(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
