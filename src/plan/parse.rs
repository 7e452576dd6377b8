//! 解析模型输出的计划
//!
//! 期望格式：{"steps": [{"tool": "...", "args": {...}, "description": "..."}]}；
//! 兼容旧格式 {"execution_plan": [{"step", "subtask_name", "description", "tool_to_use", "reasoning"}]}，
//! 以及包在 ```json 代码块或前后带说明文字的 JSON、裸数组。

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

/// 计划输出格式（同时用于生成注入提示词的 JSON Schema）
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PlanFormat {
    /// 有序的工具调用列表
    #[serde(alias = "execution_plan")]
    pub steps: Vec<PlannedStep>,
}

/// 模型给出的一步（未经校验）
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PlannedStep {
    /// 工具名，必须来自工具目录
    #[serde(alias = "tool_to_use")]
    pub tool: String,
    /// 工具参数，必须满足该工具的参数 schema
    #[serde(default, alias = "arguments")]
    pub args: Value,
    /// 这一步要做什么（简短）
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    #[schemars(skip)]
    pub subtask_name: Option<String>,
}

impl PlannedStep {
    pub fn label(&self) -> Option<String> {
        self.description.clone().or_else(|| self.subtask_name.clone())
    }
}

/// 计划格式的 JSON Schema 字符串，可拼入 system prompt
pub fn plan_schema_json() -> String {
    let schema = schema_for!(PlanFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 从模型文本中提取并解析计划
pub fn parse_plan_output(output: &str) -> Result<Vec<PlannedStep>, String> {
    let json_str = extract_json(output).ok_or_else(|| {
        format!("no JSON found in model output: {}", preview(output))
    })?;

    if let Ok(plan) = serde_json::from_str::<PlanFormat>(json_str) {
        return Ok(plan.steps);
    }
    serde_json::from_str::<Vec<PlannedStep>>(json_str)
        .map_err(|e| format!("{e}: {}", preview(json_str)))
}

fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();

    if let Some(start) = trimmed.find("```") {
        let rest = &trimmed[start + 3..];
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let body = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest).trim();
        if !body.is_empty() {
            return Some(body);
        }
    }

    let obj = trimmed.find('{').zip(trimmed.rfind('}'));
    let arr = trimmed.find('[').zip(trimmed.rfind(']'));
    let (start, end) = match (obj, arr) {
        (Some(o), Some(a)) if a.0 < o.0 => a,
        (Some(o), _) => o,
        (None, Some(a)) => a,
        (None, None) => return None,
    };
    (start < end).then(|| &trimmed[start..=end])
}

fn preview(s: &str) -> String {
    let s = s.trim();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}
