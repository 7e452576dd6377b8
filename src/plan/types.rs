//! 计划数据模型：Plan / Step / StepStatus
//!
//! Plan 一旦被接受，步骤的顺序、工具与参数不再改变；只有 Orchestrator 通过
//! start_step / finish_step 推进每一步的状态。索引从 0 开始连续递增，
//! 前一步未到达终态（succeeded / failed）时后一步不能开始。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::tools::Observation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Succeeded | StepStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StepStatus::Pending),
            "running" => Some(StepStatus::Running),
            "succeeded" => Some(StepStatus::Succeeded),
            "failed" => Some(StepStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 违反步骤推进顺序
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("step {0} is out of range")]
    OutOfRange(usize),

    #[error("step {0} cannot start before step {1} has finished")]
    PredecessorUnfinished(usize, usize),

    #[error("step {index} is {status}, expected {expected}")]
    UnexpectedStatus {
        index: usize,
        status: StepStatus,
        expected: StepStatus,
    },
}

/// 计划中的一步工具调用
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub index: usize,
    pub tool: String,
    pub args: Value,
    /// 模型给出的步骤说明（仅用于日志）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    observation: Option<String>,
}

impl Step {
    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn observation(&self) -> Option<&str> {
        self.observation.as_deref()
    }
}

/// 一次会话的执行计划
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    /// 按给定顺序构建计划，索引 0..N
    pub fn new<I>(calls: I) -> Self
    where
        I: IntoIterator<Item = (String, Value, Option<String>)>,
    {
        let steps = calls
            .into_iter()
            .enumerate()
            .map(|(index, (tool, args, description))| Step {
                index,
                tool,
                args,
                description,
                status: StepStatus::Pending,
                observation: None,
            })
            .collect();
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.tool.as_str()).collect()
    }

    /// pending -> running；要求前一步已到终态
    pub fn start_step(&mut self, index: usize) -> Result<&Step, StepError> {
        if index >= self.steps.len() {
            return Err(StepError::OutOfRange(index));
        }
        if index > 0 && !self.steps[index - 1].status.is_terminal() {
            return Err(StepError::PredecessorUnfinished(index, index - 1));
        }
        let step = &mut self.steps[index];
        if step.status != StepStatus::Pending {
            return Err(StepError::UnexpectedStatus {
                index,
                status: step.status,
                expected: StepStatus::Pending,
            });
        }
        step.status = StepStatus::Running;
        Ok(step)
    }

    /// running -> succeeded / failed，并挂上 Observation
    pub fn finish_step(&mut self, index: usize, observation: &Observation) -> Result<&Step, StepError> {
        let step = self
            .steps
            .get_mut(index)
            .ok_or(StepError::OutOfRange(index))?;
        if step.status != StepStatus::Running {
            return Err(StepError::UnexpectedStatus {
                index,
                status: step.status,
                expected: StepStatus::Running,
            });
        }
        step.status = if observation.success {
            StepStatus::Succeeded
        } else {
            StepStatus::Failed
        };
        step.observation = Some(observation.text.clone());
        Ok(step)
    }

    /// (succeeded, failed)
    pub fn counts(&self) -> (usize, usize) {
        self.steps.iter().fold((0, 0), |(ok, failed), s| match s.status {
            StepStatus::Succeeded => (ok + 1, failed),
            StepStatus::Failed => (ok, failed + 1),
            _ => (ok, failed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan(n: usize) -> Plan {
        Plan::new((0..n).map(|i| (format!("tool{i}"), json!({}), None)))
    }

    #[test]
    fn test_indices_are_contiguous() {
        let p = plan(3);
        let indices: Vec<usize> = p.steps().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(p.steps().iter().all(|s| s.status() == StepStatus::Pending));
    }

    #[test]
    fn test_step_order_enforced() {
        let mut p = plan(2);
        assert_eq!(
            p.start_step(1).unwrap_err(),
            StepError::PredecessorUnfinished(1, 0)
        );
        p.start_step(0).unwrap();
        assert!(p.start_step(1).is_err());
        p.finish_step(0, &Observation::success("ok")).unwrap();
        assert_eq!(p.start_step(1).unwrap().status(), StepStatus::Running);
        assert!(matches!(p.start_step(5), Err(StepError::OutOfRange(5))));
    }

    #[test]
    fn test_finish_requires_running() {
        let mut p = plan(1);
        let err = p
            .finish_step(0, &Observation::success("ok"))
            .unwrap_err();
        assert!(matches!(err, StepError::UnexpectedStatus { .. }));
    }

    #[test]
    fn test_counts() {
        let mut p = plan(3);
        p.start_step(0).unwrap();
        p.finish_step(0, &Observation::success("a")).unwrap();
        p.start_step(1).unwrap();
        let failed = Observation {
            success: false,
            text: "Error: x".into(),
        };
        let step = p.finish_step(1, &failed).unwrap();
        assert_eq!(step.observation(), Some("Error: x"));
        assert_eq!(p.counts(), (1, 1));
    }

    #[test]
    fn test_status_strings() {
        for s in [
            StepStatus::Pending,
            StepStatus::Running,
            StepStatus::Succeeded,
            StepStatus::Failed,
        ] {
            assert_eq!(StepStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(StepStatus::parse("done"), None);
    }
}
