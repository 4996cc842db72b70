use async_trait::async_trait;
use nexus_core::ZoneId;
use nexus_store::RevisionRepository;

/// Adapts [`RevisionRepository`] to the [`nexus_cache::RevisionSource`] seam
/// the [`nexus_cache::RevisionBroker`] fetches through. An unregistered
/// zone reads as revision 0 rather than erroring — `ensure_zone` is the
/// Admin/Bulk Interface's job, not the broker's.
pub struct StoreRevisionSource {
    revisions: RevisionRepository,
}

impl StoreRevisionSource {
    pub fn new(revisions: RevisionRepository) -> Self {
        Self { revisions }
    }
}

#[async_trait]
impl nexus_cache::RevisionSource for StoreRevisionSource {
    async fn current_version(&self, zone: ZoneId) -> nexus_cache::Result<u64> {
        let revision = self
            .revisions
            .current_revision(zone)
            .await
            .map_err(|err| nexus_cache::CacheError::RevisionUnavailable(err.to_string()))?
            .unwrap_or(0);
        Ok(revision as u64)
    }
}
