use std::time::Duration;

/// Tunables for the L1 revision cache and the revision broker sitting in
/// front of it. Mirrors the `*Config::from_env()` idiom the teacher uses for
/// `DatabaseConfig`/`CacheConfig`.
#[derive(Debug, Clone)]
pub struct L1Config {
    /// Maximum number of decision entries held by the L1 LRU.
    pub l1_capacity: u64,
    /// How many zone writes share one revision bucket. Smaller windows
    /// evict more eagerly; larger windows tolerate more staleness under a
    /// low write rate before a bucket change forces a re-check.
    pub revision_quantization_window: u64,
    /// How long the revision broker trusts a fetched `current_version`
    /// before re-fetching from the Tuple Store. Bounds cross-process
    /// staleness of an L1 hit.
    pub revision_broker_ttl: Duration,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            l1_capacity: 100_000,
            revision_quantization_window: 10,
            revision_broker_ttl: Duration::from_millis(1000),
        }
    }
}

impl L1Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            l1_capacity: std::env::var("NEXUS_L1_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.l1_capacity),
            revision_quantization_window: std::env::var("NEXUS_REVISION_QUANTIZATION_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.revision_quantization_window),
            revision_broker_ttl: std::env::var("NEXUS_REVISION_BROKER_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default.revision_broker_ttl),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = L1Config::default();
        assert_eq!(cfg.l1_capacity, 100_000);
        assert_eq!(cfg.revision_quantization_window, 10);
        assert_eq!(cfg.revision_broker_ttl, Duration::from_millis(1000));
    }
}
