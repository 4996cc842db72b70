use std::sync::Arc;

use moka::sync::Cache;
use nexus_core::{ObjectRef, Subject, ZoneId};

use crate::broker::RevisionBroker;
use crate::config::L1Config;
use crate::error::Result;
use crate::key::CheckKey;

/// The cached outcome of a single `(subject, permission, object, zone)`
/// check, as decided by the Check Engine at some revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn from_bool(allow: bool) -> Self {
        if allow {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }

    pub fn is_allow(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// `revision / window`. Two checks in the same zone land in the same
/// bucket, hence the same cache key, as long as fewer than `window` writes
/// separate them — this is what makes the key **stable while the zone is
/// quiescent** (spec.md §4.3) rather than merely stable within a fixed
/// wall-clock interval.
pub fn revision_bucket(revision: u64, window: u64) -> u64 {
    if window == 0 {
        revision
    } else {
        revision / window
    }
}

/// Process-local decision cache keyed by the revision-quantized check
/// tuple. Built on `moka::sync::Cache`, which stripes its internal locks
/// the way the spec's "L1 is a lock-striped LRU" (§5) calls for, rather
/// than a hand-rolled `Mutex<LruCache>`.
pub struct L1Cache {
    entries: Cache<CheckKey, Decision>,
    broker: Arc<RevisionBroker>,
    window: u64,
}

impl L1Cache {
    pub fn new(broker: Arc<RevisionBroker>, config: &L1Config) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.l1_capacity)
            .support_invalidation_closures()
            .build();
        Self {
            entries,
            broker,
            window: config.revision_quantization_window,
        }
    }

    async fn key_for(
        &self,
        subject: &Subject,
        permission: &str,
        object: &ObjectRef,
        zone: ZoneId,
    ) -> Result<CheckKey> {
        let revision = self.broker.current_version(zone).await?;
        let bucket = revision_bucket(revision, self.window);
        Ok(CheckKey::new(subject, permission, object, zone, bucket))
    }

    pub async fn get(
        &self,
        subject: &Subject,
        permission: &str,
        object: &ObjectRef,
        zone: ZoneId,
    ) -> Result<Option<Decision>> {
        let key = self.key_for(subject, permission, object, zone).await?;
        Ok(self.entries.get(&key))
    }

    pub async fn put(
        &self,
        subject: &Subject,
        permission: &str,
        object: &ObjectRef,
        zone: ZoneId,
        decision: Decision,
    ) -> Result<()> {
        let key = self.key_for(subject, permission, object, zone).await?;
        self.entries.insert(key, decision);
        Ok(())
    }

    /// Drops every cached decision for `zone` and forces the next check to
    /// refresh its revision before consulting L1. Both halves matter: the
    /// revision bump alone isn't enough, since a single write can leave the
    /// zone in the same `revision_bucket` (spec.md §4.3's window quantizes
    /// several revisions together), in which case the old `CheckKey` would
    /// still match and `get` would keep returning the decision this write
    /// just made stale.
    pub fn invalidate_zone(&self, zone: ZoneId) {
        self.broker.invalidate(zone);
        let _ = self.entries.invalidate_entries_if(move |k, _| k.zone == zone);
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::RevisionSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use uuid::Uuid;

    struct FixedSource(AtomicU64);

    #[async_trait]
    impl RevisionSource for FixedSource {
        async fn current_version(&self, _zone: ZoneId) -> Result<u64> {
            Ok(self.0.load(Ordering::SeqCst))
        }
    }

    fn cache_with_revision(revision: u64) -> (L1Cache, Arc<FixedSource>) {
        let source = Arc::new(FixedSource(AtomicU64::new(revision)));
        let broker = Arc::new(RevisionBroker::new(source.clone(), &L1Config::default()));
        (L1Cache::new(broker, &L1Config::default()), source)
    }

    #[tokio::test]
    async fn miss_then_hit_round_trips() {
        let (cache, _source) = cache_with_revision(0);
        let zone = ZoneId::new(Uuid::nil());
        let subject = Subject::principal("user", "alice");
        let object = ObjectRef::new("document", "doc1");

        assert!(cache.get(&subject, "read", &object, zone).await.unwrap().is_none());
        cache.put(&subject, "read", &object, zone, Decision::Allow).await.unwrap();
        assert_eq!(
            cache.get(&subject, "read", &object, zone).await.unwrap(),
            Some(Decision::Allow)
        );
    }

    #[tokio::test]
    async fn cache_key_is_stable_within_a_quiet_bucket() {
        let (cache, _source) = cache_with_revision(4);
        let zone = ZoneId::new(Uuid::nil());
        let subject = Subject::principal("user", "alice");
        let object = ObjectRef::new("document", "doc1");

        cache.put(&subject, "read", &object, zone, Decision::Allow).await.unwrap();
        // Same revision, queried again "later": still a hit, no re-keying.
        assert_eq!(
            cache.get(&subject, "read", &object, zone).await.unwrap(),
            Some(Decision::Allow)
        );
    }

    #[tokio::test]
    async fn zone_invalidation_forces_revision_refresh() {
        let (cache, source) = cache_with_revision(0);
        let zone = ZoneId::new(Uuid::nil());
        let subject = Subject::principal("user", "alice");
        let object = ObjectRef::new("document", "doc1");

        cache.put(&subject, "read", &object, zone, Decision::Allow).await.unwrap();
        source.0.store(100, Ordering::SeqCst);
        cache.invalidate_zone(zone);
        // Revision bucket changed (window=10, 0 -> 10), so the old entry
        // no longer matches the new key; this is a miss, not a stale hit.
        assert!(cache.get(&subject, "read", &object, zone).await.unwrap().is_none());
    }

    /// The reproduction a single-write invalidation must not regress on: a
    /// write that bumps the revision by 1 (e.g. one new tuple) leaves the
    /// default `window = 10` bucket unchanged, so the `CheckKey` is
    /// identical before and after. If `invalidate_zone` only dropped the
    /// broker's cached revision, the stale `Allow` would still be served.
    #[tokio::test]
    async fn zone_invalidation_clears_stale_entry_within_the_same_bucket() {
        let (cache, source) = cache_with_revision(0);
        let zone = ZoneId::new(Uuid::nil());
        let subject = Subject::principal("user", "alice");
        let object = ObjectRef::new("document", "doc1");

        cache.put(&subject, "read", &object, zone, Decision::Allow).await.unwrap();
        source.0.store(1, Ordering::SeqCst);
        assert_eq!(revision_bucket(0, 10), revision_bucket(1, 10));

        cache.invalidate_zone(zone);
        assert!(cache.get(&subject, "read", &object, zone).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zone_invalidation_does_not_touch_other_zones() {
        let (cache, _source) = cache_with_revision(0);
        let zone_a = ZoneId::new(Uuid::nil());
        let zone_b = ZoneId::new(Uuid::max());
        let subject = Subject::principal("user", "alice");
        let object = ObjectRef::new("document", "doc1");

        cache.put(&subject, "read", &object, zone_a, Decision::Allow).await.unwrap();
        cache.put(&subject, "read", &object, zone_b, Decision::Allow).await.unwrap();
        cache.invalidate_zone(zone_a);

        assert!(cache.get(&subject, "read", &object, zone_a).await.unwrap().is_none());
        assert_eq!(
            cache.get(&subject, "read", &object, zone_b).await.unwrap(),
            Some(Decision::Allow)
        );
    }

    #[test]
    fn revision_bucket_quantizes_by_window() {
        assert_eq!(revision_bucket(0, 10), 0);
        assert_eq!(revision_bucket(9, 10), 0);
        assert_eq!(revision_bucket(10, 10), 1);
        assert_eq!(revision_bucket(25, 10), 2);
    }

    proptest::proptest! {
        /// Revision monotonicity (spec.md §8): the bucket function is
        /// monotonically non-decreasing in the revision, for any window —
        /// a later revision never maps to an earlier bucket, which is what
        /// keeps a zone's cache keys from going backwards as writes land.
        #[test]
        fn revision_bucket_is_monotonic(lo in 0u64..1_000_000, delta in 0u64..1_000_000, window in 1u64..1_000) {
            let hi = lo + delta;
            proptest::prop_assert!(revision_bucket(lo, window) <= revision_bucket(hi, window));
        }

        /// Cache-key stability (spec.md §4.3): two `CheckKey`s built from
        /// identical inputs compare equal regardless of how many times
        /// they're reconstructed — the correctness property write-through
        /// and read-back both rely on.
        #[test]
        fn check_key_is_stable_for_identical_inputs(
            subject_id in "[a-z]{1,16}",
            permission in "[a-z]{1,16}",
            object_id in "[a-z]{1,16}",
            bucket in 0u64..1000,
        ) {
            let subject = Subject::principal("user", subject_id.clone());
            let object = ObjectRef::new("document", object_id.clone());
            let zone = ZoneId::new(uuid::Uuid::nil());
            let a = CheckKey::new(&subject, &permission, &object, zone, bucket);
            let b = CheckKey::new(&subject, &permission, &object, zone, bucket);
            proptest::prop_assert_eq!(a, b);
        }
    }
}
