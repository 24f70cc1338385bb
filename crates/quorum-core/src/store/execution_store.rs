use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;

use crate::db::Database;
use crate::error::EngineError;
use crate::models::execution::{ExecutionRecord, ExecutionStatus};

const SELECT_COLUMNS: &str = "SELECT id, workflow_id, status, current_step, data, suspension, \
     result, error, warnings, created_at, updated_at FROM executions";

/// Persisted execution records. The chain driver is the only writer for a
/// given execution id; `claim_suspended` is the compare-and-set that hands
/// that ownership to exactly one resumer.
#[derive(Clone)]
pub struct ExecutionStore {
    db: Database,
}

impl ExecutionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn insert(&self, record: &ExecutionRecord) -> Result<(), EngineError> {
        let row = StoredRow::from_record(record)?;
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO executions (id, workflow_id, status, current_step, data, suspension, \
                     result, error, warnings, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    rusqlite::params![
                        row.id,
                        row.workflow_id,
                        row.status,
                        row.current_step,
                        row.data,
                        row.suspension,
                        row.result,
                        row.error,
                        row.warnings,
                        row.created_at,
                        row.updated_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn save(&self, record: &ExecutionRecord) -> Result<(), EngineError> {
        let row = StoredRow::from_record(record)?;
        let updated = self
            .db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE executions SET status=?2, current_step=?3, data=?4, suspension=?5, \
                     result=?6, error=?7, warnings=?8, updated_at=?9 WHERE id=?1",
                    rusqlite::params![
                        row.id,
                        row.status,
                        row.current_step,
                        row.data,
                        row.suspension,
                        row.result,
                        row.error,
                        row.warnings,
                        row.updated_at,
                    ],
                )
            })
            .await?;

        if updated == 0 {
            return Err(EngineError::NotFound(format!("Execution {}", record.id)));
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<ExecutionRecord>, EngineError> {
        let id = id.to_string();
        let row = self
            .db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                    rusqlite::params![id],
                    StoredRow::from_row,
                )
                .optional()
            })
            .await?;
        row.map(StoredRow::into_record).transpose()
    }

    pub async fn list(&self, workflow_id: Option<&str>) -> Result<Vec<ExecutionRecord>, EngineError> {
        let workflow_id = workflow_id.map(|s| s.to_string());
        let rows = self
            .db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE (?1 IS NULL OR workflow_id = ?1) ORDER BY created_at DESC",
                    SELECT_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![workflow_id], StoredRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(StoredRow::into_record).collect()
    }

    /// Atomically move a record from `suspended` to `running`, provided it
    /// is still paused exactly where `snapshot` saw it.
    ///
    /// Returns the claimed record, or `None` when the record is missing, no
    /// longer suspended, or has moved on to a different pause since the
    /// snapshot was read.
    pub async fn claim_suspended(
        &self,
        snapshot: &ExecutionRecord,
    ) -> Result<Option<ExecutionRecord>, EngineError> {
        let claim_id = snapshot.id.clone();
        let step = snapshot.current_step as i64;
        let seen_at = snapshot.updated_at.timestamp_millis();
        let now = Utc::now().timestamp_millis();
        let claimed = self
            .db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE executions SET status = 'running', suspension = NULL, updated_at = ?4 \
                     WHERE id = ?1 AND status = 'suspended' AND current_step = ?2 AND updated_at = ?3",
                    rusqlite::params![claim_id, step, seen_at, now],
                )
            })
            .await?;

        if claimed == 0 {
            return Ok(None);
        }
        self.get(&snapshot.id).await
    }

    /// Retention policy: drop finished records last touched before `cutoff`.
    /// Running and suspended records are never purged.
    pub async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize, EngineError> {
        let cutoff_ms = cutoff.timestamp_millis();
        let purged = self
            .db
            .with_conn_async(move |conn| {
                conn.execute(
                    "DELETE FROM executions \
                     WHERE status IN ('completed', 'failed') AND updated_at < ?1",
                    rusqlite::params![cutoff_ms],
                )
            })
            .await?;
        if purged > 0 {
            tracing::info!("[ExecutionStore] Purged {} finished execution(s)", purged);
        }
        Ok(purged)
    }
}

/// Column-level representation; JSON columns stay as text until decoded.
struct StoredRow {
    id: String,
    workflow_id: String,
    status: String,
    current_step: i64,
    data: String,
    suspension: Option<String>,
    result: Option<String>,
    error: Option<String>,
    warnings: String,
    created_at: i64,
    updated_at: i64,
}

impl StoredRow {
    fn from_record(record: &ExecutionRecord) -> Result<Self, EngineError> {
        Ok(Self {
            id: record.id.clone(),
            workflow_id: record.workflow_id.clone(),
            status: record.status.as_str().to_string(),
            current_step: record.current_step as i64,
            data: encode(&record.data)?,
            suspension: record.suspension.as_ref().map(encode).transpose()?,
            result: record.result.as_ref().map(encode).transpose()?,
            error: record.error.as_ref().map(encode).transpose()?,
            warnings: encode(&record.warnings)?,
            created_at: record.created_at.timestamp_millis(),
            updated_at: record.updated_at.timestamp_millis(),
        })
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workflow_id: row.get(1)?,
            status: row.get(2)?,
            current_step: row.get(3)?,
            data: row.get(4)?,
            suspension: row.get(5)?,
            result: row.get(6)?,
            error: row.get(7)?,
            warnings: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_record(self) -> Result<ExecutionRecord, EngineError> {
        use chrono::TimeZone;
        let to_dt = |ms: i64| Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now);

        Ok(ExecutionRecord {
            status: self.status.parse()?,
            current_step: self.current_step.max(0) as usize,
            data: decode(&self.data)?,
            suspension: self.suspension.as_deref().map(decode).transpose()?,
            result: self.result.as_deref().map(decode).transpose()?,
            error: self.error.as_deref().map(decode).transpose()?,
            warnings: decode(&self.warnings)?,
            created_at: to_dt(self.created_at),
            updated_at: to_dt(self.updated_at),
            id: self.id,
            workflow_id: self.workflow_id,
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, EngineError> {
    serde_json::from_str(raw)
        .map_err(|e| EngineError::Database(format!("Corrupt execution column: {}", e)))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, EngineError> {
    serde_json::to_string(value)
        .map_err(|e| EngineError::Internal(format!("Failed to encode column: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::execution::Suspension;

    fn store() -> ExecutionStore {
        ExecutionStore::new(Database::open_in_memory().unwrap())
    }

    fn suspended_record() -> ExecutionRecord {
        let mut record = ExecutionRecord::new("wf", serde_json::json!({ "n": 1 }));
        record
            .mark_suspended(Suspension {
                step_id: "review".to_string(),
                reason: "waiting".to_string(),
                state: serde_json::json!({ "ticket": 7 }),
                suspended_at: Utc::now(),
            })
            .unwrap();
        record
    }

    #[tokio::test]
    async fn test_insert_and_get_preserves_suspension() {
        let store = store();
        let record = suspended_record();
        store.insert(&record).await.unwrap();

        let loaded = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Suspended);
        assert_eq!(loaded.data, serde_json::json!({ "n": 1 }));
        let suspension = loaded.suspension.unwrap();
        assert_eq!(suspension.reason, "waiting");
        assert_eq!(suspension.state["ticket"], 7);
    }

    #[tokio::test]
    async fn test_claim_suspended_only_once() {
        let store = store();
        let record = suspended_record();
        store.insert(&record).await.unwrap();
        let snapshot = store.get(&record.id).await.unwrap().unwrap();

        let first = store.claim_suspended(&snapshot).await.unwrap();
        let claimed = first.expect("first claim should win");
        assert_eq!(claimed.status, ExecutionStatus::Running);
        assert!(claimed.suspension.is_none());

        assert!(store.claim_suspended(&snapshot).await.unwrap().is_none());
        let reloaded = store.get(&record.id).await.unwrap().unwrap();
        assert!(reloaded.suspension.is_none());
    }

    #[tokio::test]
    async fn test_stale_snapshot_cannot_claim_a_later_pause() {
        let store = store();
        let record = suspended_record();
        store.insert(&record).await.unwrap();
        let stale = store.get(&record.id).await.unwrap().unwrap();

        let mut moved = store.claim_suspended(&stale).await.unwrap().unwrap();
        moved.advance(serde_json::json!({ "n": 2 })).unwrap();
        moved
            .mark_suspended(Suspension {
                step_id: "second-review".to_string(),
                reason: "waiting again".to_string(),
                state: serde_json::json!({}),
                suspended_at: Utc::now(),
            })
            .unwrap();
        store.save(&moved).await.unwrap();

        assert!(store.claim_suspended(&stale).await.unwrap().is_none());
        let current = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(current.status, ExecutionStatus::Suspended);
        assert_eq!(current.current_step, 1);

        assert!(store.claim_suspended(&current).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_status_is_a_database_error() {
        let db = Database::open_in_memory().unwrap();
        let store = ExecutionStore::new(db.clone());
        let record = suspended_record();
        store.insert(&record).await.unwrap();

        let id = record.id.clone();
        db.with_conn(move |conn| {
            conn.execute("UPDATE executions SET status = 'paused' WHERE id = ?1", [id])
        })
        .unwrap();

        let err = store.get(&record.id).await.unwrap_err();
        assert_eq!(err.kind(), "DatabaseError");
        assert!(err.to_string().contains("unknown execution status 'paused'"));
    }

    #[tokio::test]
    async fn test_claim_missing_execution() {
        let ghost = suspended_record();
        assert!(store().claim_suspended(&ghost).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_keeps_unfinished_records() {
        let store = store();

        let mut done = ExecutionRecord::new("wf", serde_json::json!({}));
        done.mark_completed(serde_json::json!({ "ok": true })).unwrap();
        store.insert(&done).await.unwrap();

        let paused = suspended_record();
        store.insert(&paused).await.unwrap();

        let purged = store
            .purge_terminal_before(Utc::now() + chrono::Duration::seconds(5))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert!(store.get(&done.id).await.unwrap().is_none());
        assert!(store.get(&paused.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_filters_by_workflow() {
        let store = store();
        store.insert(&ExecutionRecord::new("a", serde_json::json!({}))).await.unwrap();
        store.insert(&ExecutionRecord::new("b", serde_json::json!({}))).await.unwrap();

        assert_eq!(store.list(Some("a")).await.unwrap().len(), 1);
        assert_eq!(store.list(None).await.unwrap().len(), 2);
    }
}
