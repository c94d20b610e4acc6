use anyhow::Result;
use async_trait::async_trait;
use libsql::params;
use uuid::Uuid;

use super::models::Target;
use crate::monitoring::types::{CertificateRecord, Observation};
use crate::pool::{LibsqlManager, LibsqlPool};

/// Read-only view of the monitored targets, as the engine consumes it. The
/// engine loops always use the unfiltered list; the owner-scoped variant
/// exists for API-layer callers.
#[async_trait]
pub trait TargetRegistry: Send + Sync {
    /// All registered targets
    async fn list_targets(&self) -> Result<Vec<Target>>;

    /// Targets belonging to one owner
    async fn list_targets_for_owner(&self, owner: &str) -> Result<Vec<Target>>;

    /// Insert or update a target; returns its row id
    async fn save_target(&self, target: &Target) -> Result<i64>;

    /// Delete a target by UUID
    async fn delete_target(&self, uuid: Uuid) -> Result<()>;
}

/// Durable append of observations and certificate snapshots, plus the bulk
/// deletes the retention policy drives. Deletions report counts only.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Append one probe outcome
    async fn append_observation(&self, observation: &Observation) -> Result<()>;

    /// Recent observations for a target, newest first
    async fn list_observations(&self, target_id: Uuid, limit: usize) -> Result<Vec<Observation>>;

    /// Store the latest certificate snapshot for a target
    async fn upsert_certificate(&self, record: &CertificateRecord) -> Result<()>;

    /// Latest certificate snapshot, if one was ever stored
    async fn get_certificate(&self, target_id: Uuid) -> Result<Option<CertificateRecord>>;

    /// Delete observations at or before the cutoff; returns the count
    async fn delete_observations_older_than(&self, cutoff_unix: i64) -> Result<u64>;

    /// Delete observations whose target is not in the valid set; returns the
    /// count
    async fn delete_observations_with_target_not_in(&self, valid: &[Uuid]) -> Result<u64>;
}

/// LibSQL-backed store implementing both the registry and the sink.
pub struct LibsqlStore {
    pool: LibsqlPool,
}

impl LibsqlStore {
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    fn target_from_row(row: &libsql::Row) -> Result<Target> {
        let uuid_str: String = row.get(1)?;
        let interval: i64 = row.get(4)?;
        let created_at: i64 = row.get(6)?;
        let updated_at: i64 = row.get(7)?;

        Ok(Target {
            id: Some(row.get(0)?),
            uuid: Uuid::parse_str(&uuid_str)?,
            name: row.get(2)?,
            url: row.get(3)?,
            interval_seconds: interval.max(0) as u64,
            owner: row.get(5)?,
            created_at: Target::i64_to_timestamp(created_at),
            updated_at: Target::i64_to_timestamp(updated_at),
        })
    }
}

const TARGET_COLUMNS: &str =
    "id, uuid, name, url, interval_seconds, owner, created_at, updated_at";

#[async_trait]
impl TargetRegistry for LibsqlStore {
    async fn list_targets(&self) -> Result<Vec<Target>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(&format!("SELECT {TARGET_COLUMNS} FROM targets ORDER BY id"))
            .await?;

        let mut rows = stmt.query(()).await?;
        let mut targets = Vec::new();

        while let Some(row) = rows.next().await? {
            targets.push(Self::target_from_row(&row)?);
        }

        Ok(targets)
    }

    async fn list_targets_for_owner(&self, owner: &str) -> Result<Vec<Target>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TARGET_COLUMNS} FROM targets WHERE owner = ? ORDER BY id"
            ))
            .await?;

        let mut rows = stmt.query(params![owner]).await?;
        let mut targets = Vec::new();

        while let Some(row) = rows.next().await? {
            targets.push(Self::target_from_row(&row)?);
        }

        Ok(targets)
    }

    async fn save_target(&self, target: &Target) -> Result<i64> {
        let conn = self.get_conn().await?;
        let created_at = Target::timestamp_to_i64(target.created_at);
        let updated_at = Target::timestamp_to_i64(target.updated_at);

        if let Some(id) = target.id {
            conn.execute(
                "UPDATE targets SET name = ?, url = ?, interval_seconds = ?, owner = ?, updated_at = ? WHERE id = ?",
                params![
                    target.name.clone(),
                    target.url.clone(),
                    target.interval_seconds as i64,
                    target.owner.clone(),
                    updated_at,
                    id
                ],
            )
            .await?;
            Ok(id)
        } else {
            conn.execute(
                "INSERT INTO targets (uuid, name, url, interval_seconds, owner, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    target.uuid.to_string(),
                    target.name.clone(),
                    target.url.clone(),
                    target.interval_seconds as i64,
                    target.owner.clone(),
                    created_at,
                    updated_at
                ],
            )
            .await?;

            Ok(conn.last_insert_rowid())
        }
    }

    async fn delete_target(&self, uuid: Uuid) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute("DELETE FROM targets WHERE uuid = ?", params![uuid.to_string()])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ResultSink for LibsqlStore {
    async fn append_observation(&self, observation: &Observation) -> Result<()> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO observations (target_uuid, is_up, status_code, response_time_ms, checked_at) VALUES (?, ?, ?, ?, ?)",
            params![
                observation.target_id.to_string(),
                if observation.is_up { 1 } else { 0 },
                observation.status_code as i64,
                observation.response_time_ms,
                observation.checked_at
            ],
        )
        .await?;

        Ok(())
    }

    async fn list_observations(&self, target_id: Uuid, limit: usize) -> Result<Vec<Observation>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(
                "SELECT target_uuid, is_up, status_code, response_time_ms, checked_at FROM observations WHERE target_uuid = ? ORDER BY checked_at DESC LIMIT ?",
            )
            .await?;

        let mut rows = stmt.query(params![target_id.to_string(), limit as i64]).await?;
        let mut observations = Vec::new();

        while let Some(row) = rows.next().await? {
            let uuid_str: String = row.get(0)?;
            observations.push(Observation {
                target_id: Uuid::parse_str(&uuid_str)?,
                is_up: row.get::<i64>(1)? != 0,
                status_code: row.get::<i64>(2)? as u16,
                response_time_ms: row.get(3)?,
                checked_at: row.get(4)?,
            });
        }

        Ok(observations)
    }

    async fn upsert_certificate(&self, record: &CertificateRecord) -> Result<()> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO certificates (target_uuid, host, valid_from, valid_to, issuer, error, checked_at, days_left)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(target_uuid) DO UPDATE SET
                host = excluded.host,
                valid_from = excluded.valid_from,
                valid_to = excluded.valid_to,
                issuer = excluded.issuer,
                error = excluded.error,
                checked_at = excluded.checked_at,
                days_left = excluded.days_left",
            params![
                record.target_id.to_string(),
                record.host.clone(),
                record.valid_from,
                record.valid_to,
                record.issuer.clone(),
                record.error.clone(),
                record.checked_at,
                record.days_left
            ],
        )
        .await?;

        Ok(())
    }

    async fn get_certificate(&self, target_id: Uuid) -> Result<Option<CertificateRecord>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(
                "SELECT target_uuid, host, valid_from, valid_to, issuer, error, checked_at, days_left FROM certificates WHERE target_uuid = ?",
            )
            .await?;

        let mut rows = stmt.query(params![target_id.to_string()]).await?;

        if let Some(row) = rows.next().await? {
            let uuid_str: String = row.get(0)?;
            Ok(Some(CertificateRecord {
                target_id: Uuid::parse_str(&uuid_str)?,
                host: row.get(1)?,
                valid_from: row.get(2)?,
                valid_to: row.get(3)?,
                issuer: row.get(4)?,
                error: row.get(5)?,
                checked_at: row.get(6)?,
                days_left: row.get(7)?,
            }))
        } else {
            Ok(None)
        }
    }

    async fn delete_observations_older_than(&self, cutoff_unix: i64) -> Result<u64> {
        let conn = self.get_conn().await?;
        // Inclusive boundary: a record exactly at the cutoff is deleted.
        let deleted = conn
            .execute("DELETE FROM observations WHERE checked_at <= ?", params![cutoff_unix])
            .await?;
        Ok(deleted)
    }

    async fn delete_observations_with_target_not_in(&self, valid: &[Uuid]) -> Result<u64> {
        let conn = self.get_conn().await?;

        if valid.is_empty() {
            // NOT IN () is not valid SQL; with no valid targets every
            // observation is an orphan.
            let deleted = conn.execute("DELETE FROM observations", ()).await?;
            return Ok(deleted);
        }

        let placeholders = vec!["?"; valid.len()].join(", ");
        let sql = format!("DELETE FROM observations WHERE target_uuid NOT IN ({placeholders})");
        let ids: Vec<String> = valid.iter().map(|uuid| uuid.to_string()).collect();

        let deleted = conn.execute(&sql, ids).await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Helper to create a store over a throwaway on-disk database.
    async fn create_test_store() -> Result<(LibsqlStore, LibsqlPool, tempfile::TempDir)> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test.db");

        let db = libsql::Builder::new_local(db_path.to_string_lossy().as_ref())
            .build()
            .await?;
        let manager = LibsqlManager::new(db);
        let pool: LibsqlPool = deadpool::managed::Pool::builder(manager)
            .config(deadpool::managed::PoolConfig::default())
            .build()?;

        let conn = pool.get().await?;
        crate::store::initialize_database(&conn).await?;
        drop(conn);

        Ok((LibsqlStore::new_from_pool(pool.clone()), pool, temp_dir))
    }

    fn observation(target_id: Uuid, is_up: bool, checked_at: i64) -> Observation {
        Observation {
            target_id,
            is_up,
            status_code: if is_up { 200 } else { 0 },
            response_time_ms: 42,
            checked_at,
        }
    }

    #[tokio::test]
    async fn targets_round_trip() -> Result<()> {
        let (store, _pool, _dir) = create_test_store().await?;

        let mut target = Target::new("docs".to_string(), "https://docs.example".to_string());
        target.owner = Some("alice".to_string());
        let id = store.save_target(&target).await?;
        assert!(id > 0);

        let other = Target::new("api".to_string(), "https://api.example".to_string());
        store.save_target(&other).await?;

        let all = store.list_targets().await?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "docs");
        assert_eq!(all[0].uuid, target.uuid);

        let owned = store.list_targets_for_owner("alice").await?;
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].name, "docs");

        store.delete_target(target.uuid).await?;
        assert_eq!(store.list_targets().await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn observations_list_newest_first_with_limit() -> Result<()> {
        let (store, _pool, _dir) = create_test_store().await?;
        let target_id = Uuid::new_v4();

        for checked_at in [100, 300, 200] {
            store
                .append_observation(&observation(target_id, true, checked_at))
                .await?;
        }

        let listed = store.list_observations(target_id, 2).await?;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].checked_at, 300);
        assert_eq!(listed[1].checked_at, 200);

        // Another target's history is untouched.
        assert!(store.list_observations(Uuid::new_v4(), 10).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn certificate_upsert_is_idempotent() -> Result<()> {
        let (store, pool, _dir) = create_test_store().await?;
        let target_id = Uuid::new_v4();

        let first = CertificateRecord::failure(
            target_id,
            "site.example".to_string(),
            "handshake timed out".to_string(),
        );
        store.upsert_certificate(&first).await?;

        let second = CertificateRecord::from_validity(
            target_id,
            "site.example".to_string(),
            1_700_000_000,
            1_800_000_000,
            "Example CA".to_string(),
        );
        store.upsert_certificate(&second).await?;

        let fetched = store.get_certificate(target_id).await?.unwrap();
        assert!(fetched.error.is_none());
        assert_eq!(fetched.valid_to, Some(1_800_000_000));
        assert_eq!(fetched.issuer.as_deref(), Some("Example CA"));

        // Two inspections, one stored row.
        let conn = pool.get().await?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM certificates", ())
            .await?;
        let row = rows.next().await?.unwrap();
        assert_eq!(row.get::<i64>(0)?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn get_certificate_absent_is_none() -> Result<()> {
        let (store, _pool, _dir) = create_test_store().await?;
        assert!(store.get_certificate(Uuid::new_v4()).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn age_delete_is_inclusive_and_counted() -> Result<()> {
        let (store, _pool, _dir) = create_test_store().await?;
        let target_id = Uuid::new_v4();

        store.append_observation(&observation(target_id, true, 50)).await?;
        store.append_observation(&observation(target_id, true, 100)).await?;
        store.append_observation(&observation(target_id, true, 101)).await?;

        // Cutoff 100 deletes the record exactly at the boundary too.
        let deleted = store.delete_observations_older_than(100).await?;
        assert_eq!(deleted, 2);

        let remaining = store.list_observations(target_id, 10).await?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].checked_at, 101);

        Ok(())
    }

    #[tokio::test]
    async fn orphan_delete_ignores_age() -> Result<()> {
        let (store, _pool, _dir) = create_test_store().await?;
        let kept = Uuid::new_v4();
        let orphan = Uuid::new_v4();
        let now = chrono::Utc::now().timestamp();

        store.append_observation(&observation(kept, true, now)).await?;
        // One second old, still an orphan.
        store.append_observation(&observation(orphan, true, now - 1)).await?;

        let deleted = store
            .delete_observations_with_target_not_in(&[kept])
            .await?;
        assert_eq!(deleted, 1);
        assert_eq!(store.list_observations(kept, 10).await?.len(), 1);
        assert!(store.list_observations(orphan, 10).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn empty_valid_set_orphans_everything() -> Result<()> {
        let (store, _pool, _dir) = create_test_store().await?;
        let target_id = Uuid::new_v4();
        store.append_observation(&observation(target_id, true, 10)).await?;
        store.append_observation(&observation(target_id, false, 20)).await?;

        let deleted = store.delete_observations_with_target_not_in(&[]).await?;
        assert_eq!(deleted, 2);

        Ok(())
    }
}
