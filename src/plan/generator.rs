//! PlanGenerator：调用补全服务把用户请求拆解为有序的工具调用计划
//!
//! 模型输出被当作不可信数据：每一步的工具名必须在注册表中存在，参数必须通过该工具的 schema 校验，
//! 任意一步不合法则整个计划作废（PlanError），不会返回部分计划。

use std::sync::Arc;

use thiserror::Error;

use crate::llm::{LlmClient, LlmError, Message};
use crate::plan::{parse_plan_output, plan_schema_json, Plan, PlannedStep};
use crate::tools::{validate_args, ToolRegistry};

pub const DEFAULT_MAX_STEPS: usize = 16;

/// 规划失败（对会话是致命错误）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("completion service unreachable: {0}")]
    Transport(String),

    #[error("malformed plan output: {0}")]
    Malformed(String),

    #[error("plan contains no steps")]
    Empty,

    #[error("step {index} references unknown tool '{tool}'")]
    UnknownTool { index: usize, tool: String },

    #[error("step {index} ({tool}) has invalid arguments: {detail}")]
    InvalidArguments {
        index: usize,
        tool: String,
        detail: String,
    },

    #[error("plan has {count} steps, limit is {max}")]
    TooManySteps { count: usize, max: usize },
}

impl PlanError {
    /// 是否为传输层失败（与模型输出不合法区分）
    pub fn is_transport(&self) -> bool {
        matches!(self, PlanError::Transport(_))
    }
}

impl From<LlmError> for PlanError {
    fn from(err: LlmError) -> Self {
        if err.is_transport() {
            PlanError::Transport(err.to_string())
        } else {
            PlanError::Malformed(err.to_string())
        }
    }
}

const DEFAULT_PLANNER_PROMPT: &str = r#"You are a task planning engine.

You receive:
1. A user request.
2. A JSON catalog describing the available tools and their parameter schemas.

Your job:
- Break the user request into clear, ordered steps.
- Assign exactly one tool per step, chosen only from the catalog.
- Fill "args" so that it satisfies the tool's parameter schema (all required parameters present).
- Steps run independently: a step cannot use another step's output, so give every step all the input it needs.
- Return ONLY valid JSON matching the schema below. Do not explain anything."#;

/// 计划生成器
pub struct PlanGenerator {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    max_steps: usize,
}

impl PlanGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            system_prompt: DEFAULT_PLANNER_PROMPT.to_string(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// 组装请求：system（规则 + 输出 schema）与 user（请求原文 + 工具目录）
    pub fn build_messages(&self, request: &str, registry: &ToolRegistry) -> Vec<Message> {
        let system = format!(
            "{}\n\nOUTPUT JSON SCHEMA:\n{}",
            self.system_prompt,
            plan_schema_json()
        );
        let user = format!(
            "USER REQUEST:\n{}\n\nAVAILABLE TOOLS:\n{}",
            request.trim(),
            registry.catalog_json()
        );
        vec![Message::system(system), Message::user(user)]
    }

    pub async fn generate(&self, request: &str, registry: &ToolRegistry) -> Result<Plan, PlanError> {
        let messages = self.build_messages(request, registry);
        tracing::debug!(model = self.llm.model_name(), "requesting plan");

        let output = self.llm.complete(&messages).await?;
        let drafts = parse_plan_output(&output).map_err(PlanError::Malformed)?;
        let plan = validate_plan(drafts, registry, self.max_steps)?;

        tracing::info!(steps = plan.len(), tools = ?plan.tool_names(), "plan accepted");
        Ok(plan)
    }
}

/// 校验模型给出的步骤，全部通过才生成 Plan；参数替换为规范化后的值
pub fn validate_plan(
    drafts: Vec<PlannedStep>,
    registry: &ToolRegistry,
    max_steps: usize,
) -> Result<Plan, PlanError> {
    if drafts.is_empty() {
        return Err(PlanError::Empty);
    }
    if drafts.len() > max_steps {
        return Err(PlanError::TooManySteps {
            count: drafts.len(),
            max: max_steps,
        });
    }

    let mut calls = Vec::with_capacity(drafts.len());
    for (index, draft) in drafts.into_iter().enumerate() {
        let tool = draft.tool.trim().to_string();
        let spec = registry.resolve(&tool).ok_or_else(|| PlanError::UnknownTool {
            index,
            tool: tool.clone(),
        })?;
        let args = validate_args(&spec.parameters, &draft.args).map_err(|detail| {
            PlanError::InvalidArguments {
                index,
                tool: tool.clone(),
                detail,
            }
        })?;
        let label = draft.label();
        calls.push((tool, args, label));
    }
    Ok(Plan::new(calls))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::tools::{EchoTool, LinkDetectTool};
    use serde_json::json;

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(EchoTool).unwrap();
        r.register(LinkDetectTool).unwrap();
        r
    }

    fn generator(responses: Vec<Result<String, LlmError>>) -> (PlanGenerator, Arc<MockLlmClient>) {
        let mock = Arc::new(MockLlmClient::with_responses(responses));
        (PlanGenerator::new(mock.clone()), mock)
    }

    #[tokio::test]
    async fn test_generate_valid_plan() {
        let (planner, mock) = generator(vec![Ok(json!({"steps": [
            {"tool": "link_detect", "args": {"text": "https://youtu.be/dQw4w9WgXcQ"}},
            {"tool": "echo", "args": {"text": 5}}
        ]})
        .to_string())]);

        let plan = planner.generate("summarize it", &registry()).await.unwrap();
        assert_eq!(plan.tool_names(), vec!["link_detect", "echo"]);
        // 参数已规范化
        assert_eq!(plan.steps()[1].args, json!({"text": "5"}));

        let sent = mock.last_messages();
        assert!(sent[0].content.contains("OUTPUT JSON SCHEMA"));
        assert!(sent[1].content.contains("summarize it"));
        assert!(sent[1].content.contains("link_detect"));
    }

    #[tokio::test]
    async fn test_unknown_tool_invalidates_whole_plan() {
        let (planner, _) = generator(vec![Ok(json!({"steps": [
            {"tool": "echo", "args": {"text": "ok"}},
            {"tool": "send_email", "args": {}}
        ]})
        .to_string())]);
        let err = planner.generate("x", &registry()).await.unwrap_err();
        assert_eq!(
            err,
            PlanError::UnknownTool {
                index: 1,
                tool: "send_email".into()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let (planner, _) = generator(vec![Ok(r#"{"steps": [{"tool": "echo", "args": {}}]}"#.into())]);
        let err = planner.generate("x", &registry()).await.unwrap_err();
        assert!(matches!(err, PlanError::InvalidArguments { index: 0, .. }));
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let (planner, _) = generator(vec![Ok(r#"{"steps": []}"#.into())]);
        assert_eq!(planner.generate("x", &registry()).await.unwrap_err(), PlanError::Empty);
    }

    #[tokio::test]
    async fn test_too_many_steps() {
        let steps: Vec<_> = (0..3).map(|_| json!({"tool": "echo", "args": {"text": "a"}})).collect();
        let mock = Arc::new(MockLlmClient::with_responses(vec![Ok(
            json!({ "steps": steps }).to_string()
        )]));
        let planner = PlanGenerator::new(mock).with_max_steps(2);
        assert_eq!(
            planner.generate("x", &registry()).await.unwrap_err(),
            PlanError::TooManySteps { count: 3, max: 2 }
        );
    }

    #[tokio::test]
    async fn test_transport_and_malformed_are_distinct() {
        let (planner, _) = generator(vec![Err(LlmError::Network("refused".into()))]);
        let err = planner.generate("x", &registry()).await.unwrap_err();
        assert!(err.is_transport());

        let (planner, _) = generator(vec![Ok("sorry, no plan".into())]);
        let err = planner.generate("x", &registry()).await.unwrap_err();
        assert!(matches!(err, PlanError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_mock_default_plan_echoes_request() {
        let planner = PlanGenerator::new(Arc::new(MockLlmClient::new()));
        let plan = planner.generate("hello there", &registry()).await.unwrap();
        assert_eq!(plan.tool_names(), vec!["echo"]);
        assert_eq!(plan.steps()[0].args["text"], "Echo from Mock: hello there");
    }
}
