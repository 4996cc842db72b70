use std::sync::Arc;

use async_trait::async_trait;
use moka::future::Cache;
use nexus_core::ZoneId;

use crate::config::L1Config;
use crate::error::Result;

/// The store-side seam the broker fetches through. `nexus-authz` implements
/// this over `nexus_store::RevisionRepository::current_revision`; keeping it
/// a trait here (rather than taking a concrete store dependency) avoids a
/// cache-depends-on-store edge that would otherwise be the only reason
/// `nexus-cache` needs `sqlx` in its dependency tree at all.
#[async_trait]
pub trait RevisionSource: Send + Sync {
    async fn current_version(&self, zone: ZoneId) -> Result<u64>;
}

/// TTL-bounded front for a zone's `current_version`. This is the single
/// point where cross-process cache staleness is bounded (spec.md §4.7): an
/// L1 hit can be at most `revision_broker_ttl` stale relative to the
/// durable Tuple Store, following the `moka::future::Cache` TTL idiom the
/// teacher uses for `TenantDatabaseRouter`'s connection pool cache.
pub struct RevisionBroker {
    source: Arc<dyn RevisionSource>,
    cached: Cache<ZoneId, u64>,
}

impl RevisionBroker {
    pub fn new(source: Arc<dyn RevisionSource>, config: &L1Config) -> Self {
        let cached = Cache::builder()
            .time_to_live(config.revision_broker_ttl)
            .max_capacity(10_000)
            .build();
        Self { source, cached }
    }

    /// Returns the zone's current revision, refreshing from the store at
    /// most once per TTL window. A local write invalidates this zone's
    /// entry immediately (see [`Self::invalidate`]), so a check issued by
    /// the same process that performed the write always observes it
    /// without waiting out the TTL — the ordering guarantee spec.md §5
    /// calls "within the same thread, a subsequent check observes it
    /// immediately".
    pub async fn current_version(&self, zone: ZoneId) -> Result<u64> {
        if let Some(v) = self.cached.get(&zone).await {
            return Ok(v);
        }
        let v = self.source.current_version(zone).await?;
        self.cached.insert(zone, v).await;
        Ok(v)
    }

    /// Drops the cached revision for `zone`, forcing the next
    /// `current_version` call to refresh from the store. Called by the
    /// write path immediately after a successful tuple mutation.
    pub fn invalidate(&self, zone: ZoneId) {
        self.cached.invalidate(&zone);
    }
}
