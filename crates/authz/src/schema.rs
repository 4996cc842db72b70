use std::collections::HashMap;

use nexus_core::{RewriteSchema, ZoneId};
use parking_lot::RwLock;

/// Holds the userset-rewrite schema each zone was configured with. The
/// schema is a value the Check Engine is handed per zone at setup time
/// (spec.md §3's `[SUPPLEMENT]` resolution: no tenant-administered,
/// API-key-gated "FGA store" surface), not a row anyone writes through the
/// Admin/Bulk Interface.
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<ZoneId, RewriteSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_schema(&self, zone: ZoneId, schema: RewriteSchema) {
        self.schemas.write().insert(zone, schema);
    }

    pub fn schema_for(&self, zone: ZoneId) -> Option<RewriteSchema> {
        self.schemas.read().get(&zone).cloned()
    }
}
