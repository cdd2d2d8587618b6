//! Pending-operation ledger
//!
//! Every local write is stored in `local_records` and tagged in
//! `pending_records` until a successful upload of a batch containing it is
//! acknowledged. Running a sync cycle alone never clears anything.
//!
//! ## Acknowledgement
//!
//! A record leaves the ledger only if its stored payload is exactly the one
//! that was uploaded. A record rewritten while its batch was in flight stays
//! pending and goes out with the next cycle. A failed upload is never
//! acknowledged, so the whole batch stays pending.
//!
//! ## Downloads
//!
//! Downloaded records are upserted into `local_records` without being marked
//! pending. A record with a pending local write is not overwritten: the local
//! write wins and is uploaded on the next cycle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, warn};

use crate::entity::{record_id, EntityBatch, EntityRegistry, EntityType};
use crate::model::{PendingCounts, SyncStatusSnapshot, WriteOutcome};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::schema::{init_schema, needs_init};

const META_LAST_SYNC_AT: &str = "last_sync_at";
const META_LAST_SYNC_ID: &str = "last_sync_id";
const META_PHARMACY_ID: &str = "pharmacy_id";

/// SQLite-backed ledger of local writes awaiting upload
pub struct PendingLedger {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl PendingLedger {
    /// Open or create the ledger database
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        if needs_init(&conn) {
            init_schema(&conn)?;
        }

        debug!("Opened pending ledger at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory ledger (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Location of the database file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ==================== Local writes ====================

    /// Store a local write and mark it pending
    ///
    /// `sync_available` is whether the device is online with sync enabled;
    /// it only decides how the outcome is reported, the record is pending
    /// either way.
    pub fn record_write(
        &self,
        entity: &EntityType,
        record: &Value,
        sync_available: bool,
    ) -> WriteOutcome {
        match self.try_record_write(entity, record) {
            Ok(()) if sync_available => WriteOutcome::Applied,
            Ok(()) => WriteOutcome::QueuedOffline,
            Err(e) => {
                warn!("Failed to record {} write: {}", entity, e);
                WriteOutcome::Failed(e.to_string())
            }
        }
    }

    fn try_record_write(&self, entity: &EntityType, record: &Value) -> StorageResult<()> {
        let id = record_id(record).ok_or_else(|| StorageError::MissingId {
            entity_type: entity.to_string(),
        })?;
        let payload = serde_json::to_string(record)?;
        let now = Utc::now().timestamp_millis();

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        upsert_local(&tx, entity, &id, &payload, now)?;
        tx.execute(
            "INSERT INTO pending_records (entity_type, record_id, payload, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(entity_type, record_id)
             DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
            params![entity.as_str(), id, payload, now],
        )?;
        tx.commit()?;

        debug!("Recorded pending {} write for {}", entity, id);
        Ok(())
    }

    // ==================== Pending batches ====================

    /// Materialize the pending records of one entity type, in write order
    pub fn pending_batch(&self, entity: &EntityType) -> StorageResult<EntityBatch> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT payload FROM pending_records WHERE entity_type = ? ORDER BY seq",
        )?;
        let payloads = stmt.query_map(params![entity.as_str()], |row| row.get::<_, String>(0))?;

        let mut data = Vec::new();
        for payload in payloads {
            data.push(serde_json::from_str(&payload?)?);
        }

        Ok(EntityBatch::new(entity.clone(), data))
    }

    /// Number of pending records for one entity type
    pub fn pending_count(&self, entity: &EntityType) -> StorageResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM pending_records WHERE entity_type = ?",
            params![entity.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Pending counts for every registered entity type plus a total
    pub fn pending_counts(&self, registry: &EntityRegistry) -> StorageResult<PendingCounts> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT entity_type, COUNT(*) FROM pending_records GROUP BY entity_type",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (entity, count) = row?;
            counts.insert(entity, count as u64);
        }

        Ok(PendingCounts::from_counts(registry, &counts))
    }

    /// Drop the records of a successfully uploaded batch from the ledger
    ///
    /// Returns how many records left the pending set.
    pub fn acknowledge(&self, entity: &EntityType, batch: &EntityBatch) -> StorageResult<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let mut removed = 0;
        for record in &batch.data {
            let Some(id) = record_id(record) else {
                continue;
            };
            let payload = serde_json::to_string(record)?;
            removed += tx.execute(
                "DELETE FROM pending_records
                 WHERE entity_type = ?1 AND record_id = ?2 AND payload = ?3",
                params![entity.as_str(), id, payload],
            )?;
        }

        stamp_sync(&tx)?;
        tx.commit()?;

        let still_pending = batch.count.saturating_sub(removed);
        if still_pending > 0 {
            debug!(
                "{} {} record(s) changed during upload and stay pending",
                still_pending, entity
            );
        }

        Ok(removed)
    }

    // ==================== Downloads ====================

    /// Upsert downloaded records into the local store
    ///
    /// Returns how many records were written. Records with a pending local
    /// write, or without an id, are skipped.
    pub fn apply_remote(&self, entity: &EntityType, records: &[Value]) -> StorageResult<usize> {
        let now = Utc::now().timestamp_millis();
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let mut applied = 0;
        for record in records {
            let Some(id) = record_id(record) else {
                warn!("Skipping downloaded {} record without id", entity);
                continue;
            };

            let pending: bool = tx
                .prepare_cached(
                    "SELECT 1 FROM pending_records WHERE entity_type = ? AND record_id = ?",
                )?
                .exists(params![entity.as_str(), id])?;
            if pending {
                debug!("Keeping pending local {} {} over downloaded copy", entity, id);
                continue;
            }

            let payload = serde_json::to_string(record)?;
            upsert_local(&tx, entity, &id, &payload, now)?;
            applied += 1;
        }

        stamp_sync(&tx)?;
        tx.commit()?;
        Ok(applied)
    }

    /// Look up a locally stored record
    pub fn local_record(&self, entity: &EntityType, id: &str) -> StorageResult<Option<Value>> {
        let payload: Option<String> = self
            .conn()
            .query_row(
                "SELECT payload FROM local_records WHERE entity_type = ? AND record_id = ?",
                params![entity.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;

        payload
            .map(|p| serde_json::from_str(&p).map_err(StorageError::from))
            .transpose()
    }

    /// Number of records stored locally for one entity type
    pub fn local_count(&self, entity: &EntityType) -> StorageResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM local_records WHERE entity_type = ?",
            params![entity.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ==================== Status ====================

    /// Set the pharmacy id reported in status snapshots
    pub fn set_pharmacy_id(&self, pharmacy_id: &str) -> StorageResult<()> {
        set_meta(&self.conn(), META_PHARMACY_ID, pharmacy_id)?;
        Ok(())
    }

    /// Snapshot of last sync and pending counts
    pub fn status(&self, registry: &EntityRegistry) -> StorageResult<SyncStatusSnapshot> {
        let pending_sync = self.pending_counts(registry)?;

        let conn = self.conn();
        let last_sync_at = get_meta(&conn, META_LAST_SYNC_AT)?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(SyncStatusSnapshot {
            pharmacy_id: get_meta(&conn, META_PHARMACY_ID)?,
            last_sync_at,
            last_sync_id: get_meta(&conn, META_LAST_SYNC_ID)?,
            is_synced: pending_sync.total == 0,
            pending_sync,
        })
    }
}

fn upsert_local(
    conn: &Connection,
    entity: &EntityType,
    id: &str,
    payload: &str,
    now: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO local_records (entity_type, record_id, payload, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(entity_type, record_id)
         DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
        params![entity.as_str(), id, payload, now],
    )?;
    Ok(())
}

fn stamp_sync(conn: &Connection) -> rusqlite::Result<()> {
    set_meta(conn, META_LAST_SYNC_AT, &Utc::now().to_rfc3339())?;
    set_meta(conn, META_LAST_SYNC_ID, &uuid::Uuid::new_v4().to_string())
}

fn set_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO sync_meta (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

fn get_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM sync_meta WHERE key = ?",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn ledger() -> PendingLedger {
        PendingLedger::open_in_memory().unwrap()
    }

    #[test]
    fn test_write_outcomes() {
        let ledger = ledger();
        let products = EntityType::products();

        assert_eq!(
            ledger.record_write(&products, &json!({"id": "p1"}), true),
            WriteOutcome::Applied
        );
        assert_eq!(
            ledger.record_write(&products, &json!({"id": "p2"}), false),
            WriteOutcome::QueuedOffline
        );

        let outcome = ledger.record_write(&products, &json!({"name": "no id"}), true);
        assert!(matches!(outcome, WriteOutcome::Failed(_)));
        assert!(!outcome.is_stored());

        assert_eq!(ledger.pending_count(&products).unwrap(), 2);
        assert_eq!(ledger.local_count(&products).unwrap(), 2);
    }

    #[test]
    fn test_every_write_counts_until_acknowledged() {
        let ledger = ledger();
        let sales = EntityType::sales();
        ledger.record_write(&sales, &json!({"id": 1, "total": 10}), false);
        ledger.record_write(&sales, &json!({"id": 2, "total": 20}), false);
        ledger.record_write(&EntityType::products(), &json!({"id": "p"}), false);

        let counts = ledger.pending_counts(&EntityRegistry::default()).unwrap();
        assert_eq!(counts.get(&sales), 2);
        assert_eq!(counts.get(&EntityType::products()), 1);
        assert_eq!(counts.get(&EntityType::customers()), 0);
        assert_eq!(counts.total, 3);
    }

    #[test]
    fn test_rewrite_keeps_single_pending_entry() {
        let ledger = ledger();
        let customers = EntityType::customers();
        ledger.record_write(&customers, &json!({"id": "c1", "name": "A"}), true);
        ledger.record_write(&customers, &json!({"id": "c1", "name": "B"}), true);

        let batch = ledger.pending_batch(&customers).unwrap();
        assert_eq!(batch.count, 1);
        assert_eq!(batch.data[0]["name"], "B");
    }

    #[test]
    fn test_batch_preserves_write_order() {
        let ledger = ledger();
        let products = EntityType::products();
        for id in ["b", "a", "c"] {
            ledger.record_write(&products, &json!({"id": id}), true);
        }

        let batch = ledger.pending_batch(&products).unwrap();
        assert_eq!(batch.record_ids(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_acknowledge_drains_uploaded_batch() {
        let ledger = ledger();
        let products = EntityType::products();
        ledger.record_write(&products, &json!({"id": "p1"}), true);
        ledger.record_write(&products, &json!({"id": "p2"}), true);

        let batch = ledger.pending_batch(&products).unwrap();
        assert_eq!(ledger.acknowledge(&products, &batch).unwrap(), 2);
        assert_eq!(ledger.pending_count(&products).unwrap(), 0);

        let status = ledger.status(&EntityRegistry::default()).unwrap();
        assert!(status.is_synced);
        assert!(status.last_sync_at.is_some());
        assert!(status.last_sync_id.is_some());
    }

    #[test]
    fn test_unacknowledged_batch_stays_pending() {
        let ledger = ledger();
        let sales = EntityType::sales();
        ledger.record_write(&sales, &json!({"id": "s1"}), true);
        ledger.record_write(&sales, &json!({"id": "s2"}), true);

        // Upload failed: batch read but never acknowledged
        let _batch = ledger.pending_batch(&sales).unwrap();
        assert_eq!(ledger.pending_count(&sales).unwrap(), 2);
        assert!(!ledger.status(&EntityRegistry::default()).unwrap().is_synced);
    }

    #[test]
    fn test_rewrite_during_upload_stays_pending() {
        let ledger = ledger();
        let products = EntityType::products();
        ledger.record_write(&products, &json!({"id": "p1", "qty": 1}), true);
        ledger.record_write(&products, &json!({"id": "p2", "qty": 1}), true);

        let batch = ledger.pending_batch(&products).unwrap();
        ledger.record_write(&products, &json!({"id": "p1", "qty": 5}), true);

        assert_eq!(ledger.acknowledge(&products, &batch).unwrap(), 1);
        let remaining = ledger.pending_batch(&products).unwrap();
        assert_eq!(remaining.record_ids(), vec!["p1"]);
        assert_eq!(remaining.data[0]["qty"], 5);
    }

    #[test]
    fn test_apply_remote_does_not_mark_pending() {
        let ledger = ledger();
        let customers = EntityType::customers();

        let applied = ledger
            .apply_remote(&customers, &[json!({"id": "c1"}), json!({"id": "c2"}), json!({})])
            .unwrap();

        assert_eq!(applied, 2);
        assert_eq!(ledger.pending_count(&customers).unwrap(), 0);
        assert_eq!(ledger.local_count(&customers).unwrap(), 2);
    }

    #[test]
    fn test_pending_local_write_wins_over_download() {
        let ledger = ledger();
        let products = EntityType::products();
        ledger.record_write(&products, &json!({"id": "p1", "price": 12}), false);

        let applied = ledger
            .apply_remote(&products, &[json!({"id": "p1", "price": 9})])
            .unwrap();

        assert_eq!(applied, 0);
        let local = ledger.local_record(&products, "p1").unwrap().unwrap();
        assert_eq!(local["price"], 12);
    }

    #[test]
    fn test_download_overwrites_synced_record() {
        let ledger = ledger();
        let products = EntityType::products();
        ledger.record_write(&products, &json!({"id": "p1", "price": 12}), true);
        let batch = ledger.pending_batch(&products).unwrap();
        ledger.acknowledge(&products, &batch).unwrap();

        ledger
            .apply_remote(&products, &[json!({"id": "p1", "price": 9})])
            .unwrap();

        let local = ledger.local_record(&products, "p1").unwrap().unwrap();
        assert_eq!(local["price"], 9);
    }

    #[test]
    fn test_pharmacy_id_in_status() {
        let ledger = ledger();
        ledger.set_pharmacy_id("ph-42").unwrap();
        let status = ledger.status(&EntityRegistry::default()).unwrap();
        assert_eq!(status.pharmacy_id.as_deref(), Some("ph-42"));
        assert!(status.last_sync_at.is_none());
    }

    #[test]
    fn test_ledger_persists_to_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("ledger.db");
        let sales = EntityType::sales();

        {
            let ledger = PendingLedger::open(&path).unwrap();
            ledger.record_write(&sales, &json!({"id": "s1"}), false);
        }

        let ledger = PendingLedger::open(&path).unwrap();
        assert_eq!(ledger.path(), Some(path.as_path()));
        assert_eq!(ledger.pending_count(&sales).unwrap(), 1);
    }
}
