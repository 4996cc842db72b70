use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant isolation boundary. Every tuple, cache entry and bitmap coordinate
/// is scoped to exactly one zone; the Check Engine never evaluates a check
/// against tuples from a different zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub Uuid);

impl ZoneId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ZoneId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_id_round_trips_through_display() {
        let z = ZoneId::new(Uuid::nil());
        assert_eq!(z.to_string(), Uuid::nil().to_string());
    }

    #[test]
    fn zone_ids_are_orderable_for_btree_keys() {
        let a = ZoneId::new(Uuid::nil());
        let b = ZoneId::new(Uuid::max());
        assert!(a < b);
    }
}
