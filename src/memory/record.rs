//! 步骤日志记录：一条 MemoryRecord 对应一个已完成的 Step，写入后不再修改

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plan::{Step, StepStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    pub session_id: String,
    pub step_index: usize,
    pub tool: String,
    pub arguments: Value,
    pub observation: String,
    pub status: StepStatus,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// 由已到终态的 Step 生成记录
    pub fn from_step(session_id: &str, step: &Step) -> Self {
        Self {
            session_id: session_id.to_string(),
            step_index: step.index,
            tool: step.tool.clone(),
            arguments: step.args.clone(),
            observation: step.observation().unwrap_or_default().to_string(),
            status: step.status(),
            created_at: Utc::now(),
        }
    }
}
