use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use nexus_core::{ObjectRef, ZoneId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct IdentityKey {
    zone: Uuid,
    object_type: String,
    object_id: String,
}

/// Interns `(zone, type, id)` object references to dense 64-bit integers,
/// the coordinates the L2 bitmap index needs. A `moka::sync::Cache` fronts
/// the durable `resource_ids` table in front of the same cache-in-front-of-
/// Postgres shape `TenantDatabaseRouter` uses for connection lookups.
#[derive(Clone)]
pub struct ResourceIdentityMap {
    pool: PgPool,
    cache: Cache<IdentityKey, u64>,
}

impl ResourceIdentityMap {
    pub fn new(pool: PgPool, capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_idle(Duration::from_secs(3600))
            .build();
        Self { pool, cache }
    }

    /// Returns the dense int-id for `object` in `zone`, assigning a new one
    /// if this is the first time the object has been seen.
    pub async fn intern(&self, zone: ZoneId, object: &ObjectRef) -> Result<u64> {
        let key = IdentityKey {
            zone: zone.as_uuid(),
            object_type: object.object_type.as_str().to_string(),
            object_id: object.object_id.clone(),
        };

        if let Some(id) = self.cache.get(&key) {
            return Ok(id);
        }

        let id = self.intern_uncached(&key).await?;
        self.cache.insert(key, id);
        Ok(id)
    }

    async fn intern_uncached(&self, key: &IdentityKey) -> Result<u64> {
        if let Some(row) = sqlx::query_as::<_, (i64,)>(
            "SELECT int_id FROM resource_ids WHERE zone_id = $1 AND object_type = $2 AND object_id = $3",
        )
        .bind(key.zone)
        .bind(&key.object_type)
        .bind(&key.object_id)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(row.0 as u64);
        }

        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO resource_ids (zone_id, object_type, object_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (zone_id, object_type, object_id)
                DO UPDATE SET object_id = EXCLUDED.object_id
            RETURNING int_id
            "#,
        )
        .bind(key.zone)
        .bind(&key.object_type)
        .bind(&key.object_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0 as u64)
    }

    /// Looks up an already-interned id without assigning a new one.
    pub async fn lookup(&self, zone: ZoneId, object: &ObjectRef) -> Result<Option<u64>> {
        let key = IdentityKey {
            zone: zone.as_uuid(),
            object_type: object.object_type.as_str().to_string(),
            object_id: object.object_id.clone(),
        };

        if let Some(id) = self.cache.get(&key) {
            return Ok(Some(id));
        }

        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT int_id FROM resource_ids WHERE zone_id = $1 AND object_type = $2 AND object_id = $3",
        )
        .bind(key.zone)
        .bind(&key.object_type)
        .bind(&key.object_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id,)) = row {
            self.cache.insert(key, id as u64);
            return Ok(Some(id as u64));
        }
        Ok(None)
    }

    pub fn cache_entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl std::fmt::Debug for ResourceIdentityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceIdentityMap")
            .field("cache_entries", &self.cache.entry_count())
            .finish()
    }
}

/// Shared handle alias, for call sites that pass the map around behind an
/// `Arc` (the Check Engine holds one per zone group).
pub type SharedIdentityMap = Arc<ResourceIdentityMap>;
