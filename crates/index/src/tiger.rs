use std::sync::Arc;

use moka::sync::Cache;
use nexus_core::{Subject, TypeName, ZoneId};
use parking_lot::Mutex;
use roaring::RoaringTreemap;

use crate::error::Result;
use crate::key::AccessibleSetKey;

/// Subject-oriented inverted index of reachable resources ("Tiger Cache",
/// spec.md §4.4). Each entry is a `RoaringTreemap` — the 64-bit-coordinate
/// variant of the `roaring` crate, matching the Resource Int-ID's `u64`
/// range, which `RoaringBitmap`'s 32-bit coordinates cannot address.
///
/// **Invariant: positive decisions only.** A miss here is never
/// authoritative; it means "not yet materialized", not "denied". Callers
/// must always fall through to the Check Engine on a miss. This is what
/// spec.md §4.4 calls out as preventing stale deny-caching.
#[derive(Clone)]
pub struct TigerCache {
    sets: Cache<AccessibleSetKey, Arc<Mutex<RoaringTreemap>>>,
}

impl TigerCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            sets: Cache::builder()
                .max_capacity(capacity)
                .support_invalidation_closures()
                .build(),
        }
    }

    fn entry(&self, key: &AccessibleSetKey) -> Arc<Mutex<RoaringTreemap>> {
        self.sets.get_with(key.clone(), || Arc::new(Mutex::new(RoaringTreemap::new())))
    }

    /// Looks up the bitmap for `(subject, permission, object_type, zone)`
    /// and tests membership of `object_int_id`. `None` means the set has
    /// not been materialized for this subject at all — distinct from
    /// `Some(false)`, which would mean "materialized and this one is
    /// absent" but per the positive-only invariant we never store enough
    /// information to assert that, so a present-but-missing id is also
    /// reported as `None` via [`check_access`]'s caller contract: the
    /// engine treats both the same (fall through to full evaluation).
    pub fn check_access(
        &self,
        subject: &Subject,
        permission: &str,
        object_type: &TypeName,
        zone: ZoneId,
        object_int_id: u64,
    ) -> Option<bool> {
        let key = AccessibleSetKey::new(subject, permission, object_type, zone);
        let bitmap = self.sets.get(&key)?;
        let present = bitmap.lock().contains(object_int_id);
        if present {
            Some(true)
        } else {
            None
        }
    }

    pub fn get_accessible(
        &self,
        subject: &Subject,
        permission: &str,
        object_type: &TypeName,
        zone: ZoneId,
    ) -> RoaringTreemap {
        let key = AccessibleSetKey::new(subject, permission, object_type, zone);
        match self.sets.get(&key) {
            Some(bitmap) => bitmap.lock().clone(),
            None => RoaringTreemap::new(),
        }
    }

    pub fn has_materialized(
        &self,
        subject: &Subject,
        permission: &str,
        object_type: &TypeName,
        zone: ZoneId,
    ) -> bool {
        let key = AccessibleSetKey::new(subject, permission, object_type, zone);
        self.sets.contains_key(&key)
    }

    /// Inserts one resolved id into the subject's positive set. The short
    /// critical section is the `Mutex` guarding this one bitmap — the lock
    /// granularity spec.md §5 requires, scoped even finer than "per
    /// subject" since it is keyed per `(subject, permission, object_type,
    /// zone)`, which only tightens the required guarantee.
    pub fn add_to_bitmap(
        &self,
        subject: &Subject,
        permission: &str,
        object_type: &TypeName,
        zone: ZoneId,
        object_int_id: u64,
    ) -> Result<()> {
        let key = AccessibleSetKey::new(subject, permission, object_type, zone);
        let bitmap = self.entry(&key);
        bitmap.lock().insert(object_int_id);
        Ok(())
    }

    pub fn add_to_bitmap_bulk(
        &self,
        subject: &Subject,
        permission: &str,
        object_type: &TypeName,
        zone: ZoneId,
        object_int_ids: impl IntoIterator<Item = u64>,
    ) -> Result<()> {
        let key = AccessibleSetKey::new(subject, permission, object_type, zone);
        let bitmap = self.entry(&key);
        let mut guard = bitmap.lock();
        for id in object_int_ids {
            guard.insert(id);
        }
        Ok(())
    }

    pub fn remove_from_bitmap(
        &self,
        subject: &Subject,
        permission: &str,
        object_type: &TypeName,
        zone: ZoneId,
        object_int_id: u64,
    ) -> Result<()> {
        let key = AccessibleSetKey::new(subject, permission, object_type, zone);
        if let Some(bitmap) = self.sets.get(&key) {
            bitmap.lock().remove(object_int_id);
        }
        Ok(())
    }

    /// Drops every set recorded for `subject` across all permissions and
    /// object types in `zone`. This is the Write-Through Coordinator's
    /// narrowest-slice invalidation for a concrete-subject tuple write
    /// (spec.md §4.6): a `(permission, object_type)`-level slice isn't safe
    /// to target because L2 entries are keyed by the permission that was
    /// *checked*, not the relation that was written, and a rewrite rule can
    /// route the tuple's relation into a differently-named permission.
    pub fn invalidate_subject(&self, subject: &Subject, zone: ZoneId) {
        let subject_type = subject.subject_type.as_str().to_string();
        let subject_id = subject.subject_id.clone();
        self.sets.invalidate_entries_if(move |k, _| {
            k.subject_type == subject_type && k.subject_id == subject_id && k.zone == zone
        }).ok();
    }

    /// Drops every set in `zone`, regardless of subject, permission or
    /// object type. The broad fallback the coordinator reaches for when a
    /// mutation's blast radius can't be narrowed to one subject (spec.md
    /// §9: over-broad invalidation is a performance regression, not a
    /// correctness bug — the index is always reconstructible from the
    /// store).
    pub fn invalidate_zone(&self, zone: ZoneId) {
        let _ = self.sets.invalidate_entries_if(move |k, _| k.zone == zone);
    }

    pub fn entry_count(&self) -> u64 {
        self.sets.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn zone() -> ZoneId {
        ZoneId::new(Uuid::nil())
    }

    #[test]
    fn miss_on_unmaterialized_subject_is_none() {
        let cache = TigerCache::new(1000);
        let subject = Subject::principal("user", "alice");
        let object_type = TypeName::new("document");
        assert_eq!(cache.check_access(&subject, "read", &object_type, zone(), 7), None);
    }

    #[test]
    fn add_then_check_access_hits() {
        let cache = TigerCache::new(1000);
        let subject = Subject::principal("user", "alice");
        let object_type = TypeName::new("document");
        cache.add_to_bitmap(&subject, "read", &object_type, zone(), 7).unwrap();
        assert_eq!(cache.check_access(&subject, "read", &object_type, zone(), 7), Some(true));
        assert_eq!(cache.check_access(&subject, "read", &object_type, zone(), 8), None);
    }

    #[test]
    fn bulk_add_inserts_every_id() {
        let cache = TigerCache::new(1000);
        let subject = Subject::principal("user", "alice");
        let object_type = TypeName::new("document");
        cache.add_to_bitmap_bulk(&subject, "read", &object_type, zone(), [1, 2, 3]).unwrap();
        let set = cache.get_accessible(&subject, "read", &object_type, zone());
        assert_eq!(set.len(), 3);
        assert!(set.contains(2));
    }

    #[test]
    fn remove_clears_membership() {
        let cache = TigerCache::new(1000);
        let subject = Subject::principal("user", "alice");
        let object_type = TypeName::new("document");
        cache.add_to_bitmap(&subject, "read", &object_type, zone(), 7).unwrap();
        cache.remove_from_bitmap(&subject, "read", &object_type, zone(), 7).unwrap();
        assert_eq!(cache.check_access(&subject, "read", &object_type, zone(), 7), None);
    }

    #[test]
    fn invalidate_subject_forces_rematerialization_across_permissions() {
        let cache = TigerCache::new(1000);
        let subject = Subject::principal("user", "alice");
        let object_type = TypeName::new("document");
        cache.add_to_bitmap(&subject, "read", &object_type, zone(), 7).unwrap();
        cache.add_to_bitmap(&subject, "write", &object_type, zone(), 7).unwrap();
        cache.invalidate_subject(&subject, zone());
        assert!(!cache.has_materialized(&subject, "read", &object_type, zone()));
        assert!(!cache.has_materialized(&subject, "write", &object_type, zone()));
    }

    #[test]
    fn different_zones_are_isolated() {
        let cache = TigerCache::new(1000);
        let subject = Subject::principal("user", "alice");
        let object_type = TypeName::new("document");
        let zone_a = ZoneId::new(Uuid::nil());
        let zone_b = ZoneId::new(Uuid::max());
        cache.add_to_bitmap(&subject, "read", &object_type, zone_a, 7).unwrap();
        assert_eq!(cache.check_access(&subject, "read", &object_type, zone_b, 7), None);
    }

    proptest::proptest! {
        /// Model-based check against a plain `HashSet<u64>`: after an
        /// arbitrary sequence of insertions and removals, the bitmap's
        /// positive membership answers agree with the model, and an id
        /// absent from the model never reads as a positive hit — the "no
        /// deny in L2"/"positive-only" invariant (spec.md §4.4, §8) holds
        /// for every id the model says was removed or never added.
        #[test]
        fn bitmap_matches_a_hashset_model_after_arbitrary_ops(
            ops in proptest::collection::vec(
                (proptest::bool::ANY, 0u64..64),
                0..200,
            )
        ) {
            use std::collections::HashSet;

            let cache = TigerCache::new(1000);
            let subject = Subject::principal("user", "alice");
            let object_type = TypeName::new("document");
            let zone = ZoneId::new(Uuid::nil());
            let mut model: HashSet<u64> = HashSet::new();

            for (insert, id) in ops {
                if insert {
                    cache.add_to_bitmap(&subject, "read", &object_type, zone, id).unwrap();
                    model.insert(id);
                } else {
                    cache.remove_from_bitmap(&subject, "read", &object_type, zone, id).unwrap();
                    model.remove(&id);
                }
            }

            for id in 0u64..64 {
                let expected = model.contains(&id);
                let actual = cache.check_access(&subject, "read", &object_type, zone, id) == Some(true);
                proptest::prop_assert_eq!(actual, expected, "mismatch at id {}", id);
            }
            proptest::prop_assert_eq!(cache.get_accessible(&subject, "read", &object_type, zone).len(), model.len() as u64);
        }
    }
}
