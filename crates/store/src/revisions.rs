use nexus_core::ZoneId;
use sqlx::PgPool;

use crate::error::Result;

/// The hard upper bound on tuples deleted by a single `reset_zone` call.
/// `reset_zone` is specified as synchronous (see DESIGN.md's resolution of
/// the corresponding Open Question); this bound keeps a synchronous call
/// from blocking indefinitely against a zone with an unexpectedly large
/// tuple count.
pub const RESET_ZONE_TUPLE_LIMIT: i64 = 1_000_000;

/// Zone lifecycle and revision-sequence operations that don't belong to a
/// single tuple write: registering a new zone, reading its current
/// revision, and the admin-only `reset_zone` wipe.
#[derive(Clone)]
pub struct RevisionRepository {
    pool: PgPool,
}

impl RevisionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Registers `zone` at revision 0 if it doesn't already exist. Safe to
    /// call repeatedly; does not bump an existing zone's revision.
    pub async fn ensure_zone(&self, zone: ZoneId) -> Result<()> {
        sqlx::query(
            "INSERT INTO zone_revisions (zone_id, revision) VALUES ($1, 0) ON CONFLICT DO NOTHING",
        )
        .bind(zone.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn current_revision(&self, zone: ZoneId) -> Result<Option<i64>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT revision FROM zone_revisions WHERE zone_id = $1")
                .bind(zone.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(rev,)| rev))
    }

    /// Deletes every tuple in `zone` and bumps its revision once, as a
    /// single transaction. Bounded by [`RESET_ZONE_TUPLE_LIMIT`]; deleting a
    /// zone past that size requires the caller to page it down first.
    pub async fn reset_zone(&self, zone: ZoneId) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let count: (i64,) = sqlx::query_as(
            "SELECT count(*) FROM permission_tuples WHERE zone_id = $1",
        )
        .bind(zone.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        if count.0 > RESET_ZONE_TUPLE_LIMIT {
            tx.rollback().await?;
            return Err(crate::error::StoreError::Internal(format!(
                "zone {zone} exceeds reset_zone tuple limit ({} > {})",
                count.0, RESET_ZONE_TUPLE_LIMIT
            )));
        }

        let result = sqlx::query("DELETE FROM permission_tuples WHERE zone_id = $1")
            .bind(zone.as_uuid())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO zone_revisions (zone_id, revision)
            VALUES ($1, 1)
            ON CONFLICT (zone_id) DO UPDATE SET revision = zone_revisions.revision + 1
            "#,
        )
        .bind(zone.as_uuid())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
