use std::sync::Arc;

use nexus_cache::{Decision, L1Cache};
use nexus_core::{ObjectRef, PermissionTuple, Subject, ZoneId};
use nexus_index::TigerCache;
use nexus_store::SharedIdentityMap;

use crate::error::Result;

/// Write-Through Coordinator (spec.md §4.6). Owns the one path that
/// populates L1 and L2 from a Check Engine decision, and the one path that
/// invalidates them when a tuple mutation might have made an L2 entry
/// stale. Kept as its own type — rather than inlined into `CheckEngine` —
/// so the invalidation rules stay in one place the Admin/Bulk Interface
/// can call directly from `rebac_delete`/`rebac_create` without going
/// through a check.
pub struct WriteThroughCoordinator {
    l1: Arc<L1Cache>,
    l2: Arc<TigerCache>,
    identity: SharedIdentityMap,
    l2_enabled: bool,
}

impl WriteThroughCoordinator {
    pub fn new(
        l1: Arc<L1Cache>,
        l2: Arc<TigerCache>,
        identity: SharedIdentityMap,
        l2_enabled: bool,
    ) -> Self {
        Self { l1, l2, identity, l2_enabled }
    }

    /// Records a freshly-computed decision. Never caches a deny in L2
    /// (spec.md §4.4's positive-only invariant).
    pub async fn record(
        &self,
        subject: &Subject,
        permission: &str,
        object: &ObjectRef,
        zone: ZoneId,
        allow: bool,
    ) -> Result<()> {
        self.l1
            .put(subject, permission, object, zone, Decision::from_bool(allow))
            .await?;
        if allow && self.l2_enabled {
            let object_int_id = self.identity.intern(zone, object).await?;
            self.l2.add_to_bitmap(subject, permission, &object.object_type, zone, object_int_id)?;
        }
        Ok(())
    }

    /// Narrowest-slice L2 invalidation for a tuple that was just deleted,
    /// or a new deny tuple that was just created (spec.md §4.6). A
    /// concrete-subject tuple invalidates every `(permission, object_type)`
    /// set recorded for that subject in the zone, via
    /// [`TigerCache::invalidate_subject`] — not just the tuple's own
    /// relation, since a permission's rewrite can reach this tuple's
    /// relation indirectly (`read = viewer | ...`) and L2 entries are keyed
    /// by the *permission* that was checked, not the relation that was
    /// written, so a relation-keyed invalidation could miss them. A
    /// userset-subject tuple could affect an unbounded, unenumerable set of
    /// transitive members, so it falls back to the zone-wide invalidation
    /// spec.md §9 calls an acceptable "performance regression, not a
    /// correctness bug" (L2 is always reconstructible from the store via
    /// `expand`/rebuild).
    pub fn invalidate_for_tuple(&self, tuple: &PermissionTuple) {
        self.l1.invalidate_zone(tuple.zone);
        if !self.l2_enabled {
            return;
        }
        if tuple.subject.is_userset() {
            tracing::warn!(
                zone = %tuple.zone,
                relation = %tuple.relation,
                "broad L2 invalidation: userset-subject tuple touched, falling back to zone-wide invalidation"
            );
            self.l2.invalidate_zone(tuple.zone);
        } else {
            self.l2.invalidate_subject(&tuple.subject, tuple.zone);
        }
    }

    /// Zone-wide invalidation for a delete or `reset_zone` where the tuple
    /// that was removed isn't available to narrow the invalidation to a
    /// single slice (e.g. a delete identified only by id). Same fallback
    /// [`Self::invalidate_for_tuple`] takes for userset-subject tuples.
    pub fn invalidate_zone_after_delete(&self, zone: ZoneId) {
        self.l1.invalidate_zone(zone);
        if self.l2_enabled {
            self.l2.invalidate_zone(zone);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_cache::{L1Config, RevisionBroker, RevisionSource};
    use nexus_core::{deny_relation, TupleId};
    use nexus_store::ResourceIdentityMap;
    use sqlx::postgres::PgPoolOptions;
    use uuid::Uuid;

    struct ZeroRevision;

    #[async_trait::async_trait]
    impl RevisionSource for ZeroRevision {
        async fn current_version(&self, _zone: ZoneId) -> nexus_cache::Result<u64> {
            Ok(0)
        }
    }

    /// `connect_lazy` validates the URL but performs no I/O, so this is
    /// safe to build in a unit test that never actually queries Postgres
    /// (the tests below only reach paths that skip `identity` entirely).
    fn coordinator() -> WriteThroughCoordinator {
        let broker = Arc::new(RevisionBroker::new(Arc::new(ZeroRevision), &L1Config::default()));
        let l1 = Arc::new(L1Cache::new(broker, &L1Config::default()));
        let l2 = Arc::new(TigerCache::new(1000));
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/nexus_test")
            .expect("lazy pool construction does not touch the network");
        let identity = Arc::new(ResourceIdentityMap::new(pool, 1000));
        WriteThroughCoordinator { l1, l2, identity, l2_enabled: true }
    }

    #[tokio::test]
    async fn denying_never_touches_l2() {
        let coord = coordinator();
        let subject = Subject::principal("user", "alice");
        let object = ObjectRef::new("document", "doc1");
        let zone = ZoneId::new(Uuid::nil());
        coord.record(&subject, "read", &object, zone, false).await.unwrap();
        assert_eq!(coord.l2.entry_count(), 0);
    }

    fn tuple(zone: ZoneId, subject: Subject, relation: &str, object: ObjectRef) -> PermissionTuple {
        PermissionTuple {
            id: TupleId::new(1),
            zone,
            object,
            relation: relation.to_string(),
            subject,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn concrete_subject_delete_invalidates_every_permission_for_that_subject() {
        let coord = coordinator();
        let zone = ZoneId::new(Uuid::nil());
        let subject = Subject::principal("user", "alice");
        let object_type = nexus_core::TypeName::new("document");
        coord.l2.add_to_bitmap(&subject, "viewer", &object_type, zone, 7).unwrap();
        // A permission composed from `viewer` via a rewrite rule, keyed
        // under its own name ("read") rather than the written relation.
        coord.l2.add_to_bitmap(&subject, "read", &object_type, zone, 7).unwrap();

        let t = tuple(zone, subject.clone(), "viewer", ObjectRef::new("document", "doc1"));
        coord.invalidate_for_tuple(&t);

        assert!(!coord.l2.has_materialized(&subject, "viewer", &object_type, zone));
        assert!(!coord.l2.has_materialized(&subject, "read", &object_type, zone));
    }

    #[test]
    fn concrete_subject_delete_leaves_other_subjects_materialized() {
        let coord = coordinator();
        let zone = ZoneId::new(Uuid::nil());
        let alice = Subject::principal("user", "alice");
        let bob = Subject::principal("user", "bob");
        let object_type = nexus_core::TypeName::new("document");
        coord.l2.add_to_bitmap(&alice, "viewer", &object_type, zone, 7).unwrap();
        coord.l2.add_to_bitmap(&bob, "viewer", &object_type, zone, 7).unwrap();

        let t = tuple(zone, alice.clone(), "viewer", ObjectRef::new("document", "doc1"));
        coord.invalidate_for_tuple(&t);

        assert!(!coord.l2.has_materialized(&alice, "viewer", &object_type, zone));
        assert!(coord.l2.has_materialized(&bob, "viewer", &object_type, zone));
    }

    #[test]
    fn userset_subject_deny_falls_back_to_zone_wide_invalidation() {
        let coord = coordinator();
        let zone = ZoneId::new(Uuid::nil());
        let alice = Subject::principal("user", "alice");
        let object_type = nexus_core::TypeName::new("document");
        coord.l2.add_to_bitmap(&alice, "viewer", &object_type, zone, 7).unwrap();

        let group_subject = Subject::userset("group", "eng", "member");
        let t = tuple(
            zone,
            group_subject,
            &deny_relation("viewer"),
            ObjectRef::new("document", "doc1"),
        );
        coord.invalidate_for_tuple(&t);

        assert!(!coord.l2.has_materialized(&alice, "viewer", &object_type, zone));
    }
}
