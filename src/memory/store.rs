//! 步骤日志存储接口
//!
//! append 只追加、不更新不删除，同一 (session_id, step_index) 只能写一次；
//! append 返回 Ok 即视为已提交。query_by_session 按 step_index 升序返回。

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::memory::MemoryRecord;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("record for session {session_id} step {step_index} already exists")]
    Duplicate { session_id: String, step_index: usize },
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn append(&self, record: &MemoryRecord) -> Result<(), MemoryError>;

    async fn query_by_session(&self, session_id: &str) -> Result<Vec<MemoryRecord>, MemoryError>;

    /// 最近写入的记录（新的在前）
    async fn recent(&self, limit: usize) -> Result<Vec<MemoryRecord>, MemoryError>;

    /// 释放底层资源（进程退出前调用）；之后不应再写入
    async fn close(&self) {}
}

/// 内存实现（测试与无磁盘运行）
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<MemoryRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn append(&self, record: &MemoryRecord) -> Result<(), MemoryError> {
        let mut records = self.records.write().await;
        let exists = records
            .iter()
            .any(|r| r.session_id == record.session_id && r.step_index == record.step_index);
        if exists {
            return Err(MemoryError::Duplicate {
                session_id: record.session_id.clone(),
                step_index: record.step_index,
            });
        }
        records.push(record.clone());
        Ok(())
    }

    async fn query_by_session(&self, session_id: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
        let mut out: Vec<MemoryRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.step_index);
        Ok(out)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}
