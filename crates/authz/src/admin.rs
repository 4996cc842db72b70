use std::sync::Arc;

use nexus_core::{NewTuple, ObjectRef, PermissionTuple, Subject, TupleId, ZoneId};
use nexus_store::{RevisionRepository, TupleStore};

use crate::coordinator::WriteThroughCoordinator;
use crate::engine::CheckEngine;
use crate::error::{AuthzError, Result};

/// Admin/Bulk Interface (spec.md §4.7): the one surface allowed to mutate
/// tuples. Every write goes through here rather than `TupleStore` directly
/// so the Write-Through Coordinator's invalidation rule always runs
/// alongside the mutation — there is no path in this crate that writes a
/// tuple without also invalidating the caches that might now be stale.
pub struct AdminInterface {
    store: TupleStore,
    revisions: RevisionRepository,
    engine: Arc<CheckEngine>,
    coordinator: Arc<WriteThroughCoordinator>,
}

/// Narrows a domain validation error down to the `AuthzError` variant it's
/// really about, rather than letting it collapse into the generic `Core`
/// wrapper — callers checking `rebac_create`'s error kind should see
/// `InvalidSubject`/`InvalidObject`, not an opaque domain error.
fn validation_err(err: nexus_core::CoreError) -> AuthzError {
    match err {
        nexus_core::CoreError::InvalidSubject(msg) => AuthzError::InvalidSubject(msg),
        nexus_core::CoreError::InvalidObject(msg) => AuthzError::InvalidObject(msg),
        other => AuthzError::Core(other),
    }
}

impl AdminInterface {
    pub fn new(
        store: TupleStore,
        revisions: RevisionRepository,
        engine: Arc<CheckEngine>,
        coordinator: Arc<WriteThroughCoordinator>,
    ) -> Self {
        Self { store, revisions, engine, coordinator }
    }

    /// Creates a tuple. A new deny tuple can invalidate an existing L2
    /// membership entry the same way a delete would, so both the grant and
    /// deny cases route through [`WriteThroughCoordinator::invalidate_for_tuple`].
    ///
    /// Validates `subject`/`object` before touching storage (spec.md §7:
    /// malformed identifiers surface synchronously, not as a store error
    /// discovered after the fact).
    pub async fn rebac_create(&self, tuple: NewTuple) -> Result<PermissionTuple> {
        tuple.subject.validate().map_err(validation_err)?;
        tuple.object.validate().map_err(validation_err)?;

        let created = self.store.create_tuple(tuple).await?;
        self.coordinator.invalidate_for_tuple(&created);
        Ok(created)
    }

    /// Deletes a tuple by id. Looks the tuple up first so the coordinator
    /// can invalidate the exact slice it concerned; a delete of a
    /// nonexistent tuple is reported as [`AuthzError::NotFound`] rather than
    /// silently succeeding, since the caller's id was presumably stale.
    pub async fn rebac_delete(&self, zone: ZoneId, tuple_id: TupleId) -> Result<()> {
        if !self.store.tuple_exists(zone, tuple_id).await? {
            return Err(AuthzError::NotFound(format!("tuple {} in zone {}", tuple_id.0, zone)));
        }

        // The store indexes by object/subject, not id, so the deleted
        // tuple's `(subject, object, relation)` isn't available here to
        // narrow the invalidation; this falls back to the zone-wide sweep,
        // the same bound spec.md §9 accepts for userset-subject tuples.
        let deleted = self.store.delete_tuple(zone, tuple_id).await?;
        if deleted {
            self.coordinator.invalidate_zone_after_delete(zone);
        }
        Ok(())
    }

    pub async fn rebac_check(
        &self,
        subject: &Subject,
        permission: &str,
        object: &ObjectRef,
        zone: ZoneId,
    ) -> bool {
        self.engine.check(subject, permission, object, zone).await
    }

    pub async fn rebac_check_bulk(
        &self,
        requests: &[(Subject, String, ObjectRef)],
        zone: ZoneId,
    ) -> Vec<bool> {
        self.engine.check_bulk(requests, zone).await
    }

    pub async fn rebac_expand(
        &self,
        permission: &str,
        object: &ObjectRef,
        zone: ZoneId,
    ) -> Result<Vec<Subject>> {
        Ok(self.engine.expand(permission, object, zone).await?)
    }

    /// The set of resources of `object_type` that `subject` can reach via
    /// `permission`, read straight out of L2 (falling back to an empty set
    /// when unmaterialized rather than paying for a full sweep — callers
    /// that need a guaranteed-complete answer should `rebac_check` each
    /// candidate instead).
    pub fn accessible_resources(
        &self,
        subject: &Subject,
        permission: &str,
        object_type: &nexus_core::TypeName,
        zone: ZoneId,
    ) -> roaring::RoaringTreemap {
        self.engine.accessible_resources(subject, permission, object_type, zone)
    }

    /// Wipes every tuple in `zone` and bumps its revision once. Synchronous
    /// with respect to the caller (see DESIGN.md's resolution of spec.md
    /// §9's corresponding Open Question): by the time this returns, the
    /// store reflects the reset and any subsequent check against the zone
    /// (after its L1/L2 entries age out or are invalidated) will see it.
    pub async fn reset_zone(&self, zone: ZoneId) -> Result<u64> {
        let deleted = self.revisions.reset_zone(zone).await?;
        self.coordinator.invalidate_zone_after_delete(zone);
        Ok(deleted)
    }

    pub async fn ensure_zone(&self, zone: ZoneId) -> Result<()> {
        self.revisions.ensure_zone(zone).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_err_narrows_invalid_subject() {
        let err = nexus_core::CoreError::InvalidSubject("user id must not be empty".into());
        assert!(matches!(validation_err(err), AuthzError::InvalidSubject(_)));
    }

    #[test]
    fn validation_err_narrows_invalid_object() {
        let err = nexus_core::CoreError::InvalidObject("object id must not be empty".into());
        assert!(matches!(validation_err(err), AuthzError::InvalidObject(_)));
    }

    #[test]
    fn validation_err_falls_back_to_core_for_other_variants() {
        let err = nexus_core::CoreError::Schema("bad schema".into());
        assert!(matches!(validation_err(err), AuthzError::Core(_)));
    }
}
