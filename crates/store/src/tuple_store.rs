use chrono::{DateTime, Utc};
use nexus_core::{NewTuple, ObjectRef, PermissionTuple, Subject, TupleId, ZoneId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

/// Row shape mirroring the `permission_tuples` table. Kept distinct from
/// [`PermissionTuple`] so the storage layer's column types (plain strings,
/// nullable relation) stay decoupled from the domain type the rest of the
/// workspace reasons about.
#[derive(Debug, sqlx::FromRow)]
struct TupleRow {
    id: i64,
    zone_id: Uuid,
    object_type: String,
    object_id: String,
    relation: String,
    subject_type: String,
    subject_id: String,
    subject_relation: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<TupleRow> for PermissionTuple {
    fn from(row: TupleRow) -> Self {
        PermissionTuple {
            id: TupleId::new(row.id),
            zone: ZoneId::new(row.zone_id),
            object: ObjectRef::new(row.object_type, row.object_id),
            relation: row.relation,
            subject: Subject {
                subject_type: row.subject_type.into(),
                subject_id: row.subject_id,
                subject_relation: row.subject_relation,
            },
            created_at: row.created_at,
        }
    }
}

/// Postgres-backed Tuple Store. Every write bumps the zone's revision
/// sequence inside the same transaction as the tuple mutation, so a
/// revision change is always visible no later than the tuple change it
/// describes (spec.md's write-read causality invariant).
#[derive(Clone)]
pub struct TupleStore {
    pool: PgPool,
}

impl TupleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a tuple if it doesn't already exist and bumps the zone
    /// revision. Idempotent: re-creating an existing tuple is a no-op that
    /// still returns the existing row, and does not bump the revision again.
    pub async fn create_tuple(&self, tuple: NewTuple) -> Result<PermissionTuple> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, TupleRow>(
            r#"
            SELECT id, zone_id, object_type, object_id, relation,
                   subject_type, subject_id, subject_relation, created_at
            FROM permission_tuples
            WHERE zone_id = $1 AND object_type = $2 AND object_id = $3
              AND relation = $4 AND subject_type = $5 AND subject_id = $6
              AND subject_relation IS NOT DISTINCT FROM $7
            "#,
        )
        .bind(tuple.zone.as_uuid())
        .bind(tuple.object.object_type.as_str())
        .bind(&tuple.object.object_id)
        .bind(&tuple.relation)
        .bind(tuple.subject.subject_type.as_str())
        .bind(&tuple.subject.subject_id)
        .bind(&tuple.subject.subject_relation)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = existing {
            tx.rollback().await?;
            return Ok(row.into());
        }

        let row = sqlx::query_as::<_, TupleRow>(
            r#"
            INSERT INTO permission_tuples
                (zone_id, object_type, object_id, relation, subject_type, subject_id, subject_relation)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT DO NOTHING
            RETURNING id, zone_id, object_type, object_id, relation,
                      subject_type, subject_id, subject_relation, created_at
            "#,
        )
        .bind(tuple.zone.as_uuid())
        .bind(tuple.object.object_type.as_str())
        .bind(&tuple.object.object_id)
        .bind(&tuple.relation)
        .bind(tuple.subject.subject_type.as_str())
        .bind(&tuple.subject.subject_id)
        .bind(&tuple.subject.subject_relation)
        .fetch_one(&mut *tx)
        .await?;

        bump_revision(&mut tx, tuple.zone).await?;
        tx.commit().await?;

        Ok(row.into())
    }

    /// Deletes a tuple by id and bumps the zone revision. A no-op delete
    /// (tuple already gone) does not bump the revision.
    pub async fn delete_tuple(&self, zone: ZoneId, tuple_id: TupleId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "DELETE FROM permission_tuples WHERE id = $1 AND zone_id = $2",
        )
        .bind(tuple_id.0)
        .bind(zone.as_uuid())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        bump_revision(&mut tx, zone).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// All tuples naming `(object, relation)` directly, across both grant
    /// and deny relation names. Scoped to `zone` unless
    /// `enforce_zone_isolation` is `false` (spec.md §6), in which case the
    /// zone filter is dropped entirely and the traversal can see tuples
    /// written under any zone — a deliberate per-deployment bypass, never
    /// a per-request one.
    pub async fn read_by_object(
        &self,
        zone: ZoneId,
        object: &ObjectRef,
        relation: &str,
        enforce_zone_isolation: bool,
    ) -> Result<Vec<PermissionTuple>> {
        let rows = if enforce_zone_isolation {
            sqlx::query_as::<_, TupleRow>(
                r#"
                SELECT id, zone_id, object_type, object_id, relation,
                       subject_type, subject_id, subject_relation, created_at
                FROM permission_tuples
                WHERE zone_id = $1 AND object_type = $2 AND object_id = $3 AND relation = $4
                "#,
            )
            .bind(zone.as_uuid())
            .bind(object.object_type.as_str())
            .bind(&object.object_id)
            .bind(relation)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, TupleRow>(
                r#"
                SELECT id, zone_id, object_type, object_id, relation,
                       subject_type, subject_id, subject_relation, created_at
                FROM permission_tuples
                WHERE object_type = $1 AND object_id = $2 AND relation = $3
                "#,
            )
            .bind(object.object_type.as_str())
            .bind(&object.object_id)
            .bind(relation)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows.into_iter().map(PermissionTuple::from).collect())
    }

    /// All tuples naming `subject` directly (used by `tuple_to_userset` and
    /// by the accessible-resources sweep when rebuilding an L2 bitmap).
    /// Same `enforce_zone_isolation` bypass as [`Self::read_by_object`].
    pub async fn read_by_subject(
        &self,
        zone: ZoneId,
        subject: &Subject,
        relation: &str,
        enforce_zone_isolation: bool,
    ) -> Result<Vec<PermissionTuple>> {
        let rows = if enforce_zone_isolation {
            sqlx::query_as::<_, TupleRow>(
                r#"
                SELECT id, zone_id, object_type, object_id, relation,
                       subject_type, subject_id, subject_relation, created_at
                FROM permission_tuples
                WHERE zone_id = $1 AND relation = $2
                  AND subject_type = $3 AND subject_id = $4
                  AND subject_relation IS NOT DISTINCT FROM $5
                "#,
            )
            .bind(zone.as_uuid())
            .bind(relation)
            .bind(subject.subject_type.as_str())
            .bind(&subject.subject_id)
            .bind(&subject.subject_relation)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, TupleRow>(
                r#"
                SELECT id, zone_id, object_type, object_id, relation,
                       subject_type, subject_id, subject_relation, created_at
                FROM permission_tuples
                WHERE relation = $1
                  AND subject_type = $2 AND subject_id = $3
                  AND subject_relation IS NOT DISTINCT FROM $4
                "#,
            )
            .bind(relation)
            .bind(subject.subject_type.as_str())
            .bind(&subject.subject_id)
            .bind(&subject.subject_relation)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows.into_iter().map(PermissionTuple::from).collect())
    }

    pub async fn tuple_exists(&self, zone: ZoneId, tuple_id: TupleId) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM permission_tuples WHERE id = $1 AND zone_id = $2")
                .bind(tuple_id.0)
                .bind(zone.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

}

async fn bump_revision(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, zone: ZoneId) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO zone_revisions (zone_id, revision)
        VALUES ($1, 1)
        ON CONFLICT (zone_id) DO UPDATE SET revision = zone_revisions.revision + 1
        "#,
    )
    .bind(zone.as_uuid())
    .execute(&mut **tx)
    .await?;
    Ok(())
}
