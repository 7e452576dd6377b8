//! SQLite 步骤日志（sqlx 异步连接池）
//!
//! 表 step_records：id / session_id / step_index / tool / arguments(JSON) / observation / status / created_at(RFC3339)；
//! (session_id, step_index) 唯一索引保证只写一次。WAL 模式，多会话并发追加安全。

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::memory::{MemoryError, MemoryRecord, MemoryStore};
use crate::plan::StepStatus;

const SELECT_COLUMNS: &str =
    "SELECT session_id, step_index, tool, arguments, observation, status, created_at FROM step_records";

pub struct SqliteMemoryStore {
    pool: SqlitePool,
}

impl SqliteMemoryStore {
    /// 打开（必要时创建）数据库文件并建表
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let url = format!("sqlite:{}", db_path.as_ref().display());
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(storage_error)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(storage_error)?;

        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    /// 进程内数据库（单连接，测试用）
    pub async fn in_memory() -> Result<Self, MemoryError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_error)?;
        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    async fn init_tables(&self) -> Result<(), MemoryError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS step_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                step_index INTEGER NOT NULL,
                tool TEXT NOT NULL,
                arguments TEXT NOT NULL,
                observation TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_step_records_session_step
             ON step_records(session_id, step_index)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }
}

fn storage_error(err: sqlx::Error) -> MemoryError {
    MemoryError::Storage(err.to_string())
}

fn row_to_record(row: &SqliteRow) -> Result<MemoryRecord, MemoryError> {
    let step_index: i64 = row.try_get("step_index").map_err(storage_error)?;
    let arguments: String = row.try_get("arguments").map_err(storage_error)?;
    let status: String = row.try_get("status").map_err(storage_error)?;
    let created_at: String = row.try_get("created_at").map_err(storage_error)?;

    Ok(MemoryRecord {
        session_id: row.try_get("session_id").map_err(storage_error)?,
        step_index: usize::try_from(step_index)
            .map_err(|_| MemoryError::Serialization(format!("negative step_index {step_index}")))?,
        tool: row.try_get("tool").map_err(storage_error)?,
        arguments: serde_json::from_str(&arguments)
            .map_err(|e| MemoryError::Serialization(e.to_string()))?,
        observation: row.try_get("observation").map_err(storage_error)?,
        status: StepStatus::parse(&status)
            .ok_or_else(|| MemoryError::Serialization(format!("unknown status '{status}'")))?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| MemoryError::Serialization(e.to_string()))?
            .with_timezone(&Utc),
    })
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn append(&self, record: &MemoryRecord) -> Result<(), MemoryError> {
        let arguments = serde_json::to_string(&record.arguments)
            .map_err(|e| MemoryError::Serialization(e.to_string()))?;
        let step_index = i64::try_from(record.step_index)
            .map_err(|e| MemoryError::Serialization(e.to_string()))?;

        let result = sqlx::query(
            "INSERT INTO step_records
                (session_id, step_index, tool, arguments, observation, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.session_id)
        .bind(step_index)
        .bind(&record.tool)
        .bind(&arguments)
        .bind(&record.observation)
        .bind(record.status.as_str())
        .bind(record.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(MemoryError::Duplicate {
                    session_id: record.session_id.clone(),
                    step_index: record.step_index,
                })
            }
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn query_by_session(&self, session_id: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE session_id = ? ORDER BY step_index ASC, id ASC"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter().map(row_to_record).collect()
    }

    async fn recent(&self, limit: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?"))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        rows.iter().map(row_to_record).collect()
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Memory store closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn record(session: &str, index: usize, status: StepStatus) -> MemoryRecord {
        MemoryRecord {
            session_id: session.to_string(),
            step_index: index,
            tool: "transcript_fetch".to_string(),
            arguments: json!({"video": "dQw4w9WgXcQ", "nested": {"a": [1, 2]}}),
            observation: "Error: HTTP 404".to_string(),
            status,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteMemoryStore::open(dir.path().join("memory.db")).await.unwrap();

        let written = vec![
            record("s1", 0, StepStatus::Succeeded),
            record("s1", 1, StepStatus::Failed),
        ];
        for r in &written {
            store.append(r).await.unwrap();
        }
        store.append(&record("s2", 0, StepStatus::Succeeded)).await.unwrap();

        let read = store.query_by_session("s1").await.unwrap();
        assert_eq!(read, written);
        store.close().await;

        // 重新打开后记录仍在
        let reopened = SqliteMemoryStore::open(dir.path().join("memory.db")).await.unwrap();
        assert_eq!(reopened.query_by_session("s1").await.unwrap().len(), 2);
        assert_eq!(reopened.recent(10).await.unwrap()[0].session_id, "s2");
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let store = SqliteMemoryStore::in_memory().await.unwrap();
        store.append(&record("s1", 0, StepStatus::Succeeded)).await.unwrap();
        let err = store
            .append(&record("s1", 0, StepStatus::Failed))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteMemoryStore::open(dir.path().join("c.db")).await.unwrap());

        let mut handles = Vec::new();
        for s in 0..4 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let session = format!("session-{s}");
                for i in 0..5 {
                    store
                        .append(&record(&session, i, StepStatus::Succeeded))
                        .await
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        for s in 0..4 {
            let records = store.query_by_session(&format!("session-{s}")).await.unwrap();
            let indices: Vec<_> = records.iter().map(|r| r.step_index).collect();
            assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        }
    }
}
