use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::subject::{ObjectRef, Subject};
use crate::zone::ZoneId;

/// A tuple's relation name carries deny-ness as a naming convention rather
/// than a separate column: a relation prefixed with `!` is a deny tuple for
/// the relation that follows the prefix. This mirrors how the Check Engine
/// must look both relations up under one query and lets deny tuples live in
/// the same table, same index, same revision sequence as grants.
pub const DENY_PREFIX: char = '!';

/// True if `relation` names a deny tuple (`!editor`) rather than a grant.
pub fn is_deny_relation(relation: &str) -> bool {
    relation.starts_with(DENY_PREFIX)
}

/// Prefixes `relation` to form the corresponding deny relation name.
pub fn deny_relation(relation: &str) -> String {
    format!("{DENY_PREFIX}{relation}")
}

/// Strips the deny prefix, if present. Returns the input unchanged for a
/// grant relation.
pub fn strip_deny_prefix(relation: &str) -> &str {
    relation.strip_prefix(DENY_PREFIX).unwrap_or(relation)
}

/// Opaque, monotonically-assigned tuple identifier. Stored as an ordered
/// `i64` (a Postgres `BIGSERIAL`) rather than a `Uuid`: the write path needs
/// an ordering it can use for narrowest-slice invalidation bookkeeping, and
/// a random `Uuid` primary key buys nothing here since tuples are never
/// looked up by id from outside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TupleId(pub i64);

impl TupleId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }
}

/// A stored permission tuple: `(zone, object, relation, subject)`, the unit
/// the Tuple Store persists and the Check Engine reasons over. `relation`
/// may name a grant (`editor`) or a deny (`!editor`) per [`is_deny_relation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionTuple {
    pub id: TupleId,
    pub zone: ZoneId,
    pub object: ObjectRef,
    pub relation: String,
    pub subject: Subject,
    pub created_at: DateTime<Utc>,
}

impl PermissionTuple {
    pub fn is_deny(&self) -> bool {
        is_deny_relation(&self.relation)
    }

    /// The grant-side relation name this tuple concerns, stripped of any
    /// deny prefix. `editor` for both `editor` and `!editor` tuples.
    pub fn base_relation(&self) -> &str {
        strip_deny_prefix(&self.relation)
    }
}

/// The fields needed to create a new tuple; `id` and `created_at` are
/// assigned by the store on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTuple {
    pub zone: ZoneId,
    pub object: ObjectRef,
    pub relation: String,
    pub subject: Subject,
}

impl NewTuple {
    pub fn new(
        zone: ZoneId,
        object: ObjectRef,
        relation: impl Into<String>,
        subject: Subject,
    ) -> Self {
        Self {
            zone,
            object,
            relation: relation.into(),
            subject,
        }
    }

    pub fn is_deny(&self) -> bool {
        is_deny_relation(&self.relation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_relation_round_trips() {
        let grant = "editor";
        let deny = deny_relation(grant);
        assert_eq!(deny, "!editor");
        assert!(is_deny_relation(&deny));
        assert!(!is_deny_relation(grant));
        assert_eq!(strip_deny_prefix(&deny), grant);
        assert_eq!(strip_deny_prefix(grant), grant);
    }

    #[test]
    fn permission_tuple_base_relation_strips_deny_prefix() {
        use uuid::Uuid;
        let t = PermissionTuple {
            id: TupleId::new(1),
            zone: ZoneId::new(Uuid::nil()),
            object: ObjectRef::new("document", "doc1"),
            relation: deny_relation("editor"),
            subject: Subject::principal("user", "mallory"),
            created_at: Utc::now(),
        };
        assert!(t.is_deny());
        assert_eq!(t.base_relation(), "editor");
    }

    proptest::proptest! {
        /// For any relation name not already carrying the deny prefix,
        /// `deny_relation`/`strip_deny_prefix` round-trip and agree with
        /// `is_deny_relation` about which side of the prefix they're on.
        /// Grounded in `flyingrobots-echo/crates/echo-wasm-abi/tests/fuzz_wire.rs`'s
        /// `proptest!` block fuzzing a wire-format round trip.
        #[test]
        fn deny_prefix_round_trips_for_arbitrary_relation_names(
            relation in "[a-zA-Z][a-zA-Z0-9_-]{0,31}"
        ) {
            proptest::prop_assume!(!is_deny_relation(&relation));
            let deny = deny_relation(&relation);
            proptest::prop_assert!(is_deny_relation(&deny));
            proptest::prop_assert!(!is_deny_relation(&relation));
            proptest::prop_assert_eq!(strip_deny_prefix(&deny), relation.as_str());
            proptest::prop_assert_eq!(strip_deny_prefix(&relation), relation.as_str());
        }
    }
}
