//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），
//! 进程启动时由 ToolRegistry 按名注册；注册完成后包进 Arc 只读共享，
//! 供 PlanGenerator 导出工具目录、ToolDispatcher 按名解析。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 JSON Schema、异步执行
///
/// execute 收到的 args 已按 schema 校验并做过类型转换；返回 Err 表示工具自身失败，
/// 由 Dispatcher 转成失败的 Observation，不会中断会话。
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（计划 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述
    fn description(&self) -> &str;

    /// 参数 JSON Schema（{"type":"object","properties":{...},"required":[...]}）
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String>;
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    Duplicate(String),

    #[error("tool '{tool}' has an invalid parameter schema: {detail}")]
    InvalidSchema { tool: String, detail: String },
}

/// 已注册的工具：名称、描述、参数 schema 与处理器
#[derive(Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    #[serde(skip)]
    handler: Arc<dyn Tool>,
}

impl ToolSpec {
    pub fn handler(&self) -> Arc<dyn Tool> {
        Arc::clone(&self.handler)
    }

    /// schema 中声明为必填的参数名
    pub fn required_params(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|req| req.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// 工具注册表：按名称有序存储，list() 输出稳定顺序
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        let parameters = tool.parameters_schema();
        check_schema(&parameters).map_err(|detail| RegistryError::InvalidSchema {
            tool: name.clone(),
            detail,
        })?;

        tracing::debug!(tool = %name, "tool registered");
        self.tools.insert(
            name.clone(),
            ToolSpec {
                name,
                description: tool.description().to_string(),
                parameters,
                handler: tool,
            },
        );
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// 全部工具（按名称排序）
    pub fn list(&self) -> Vec<&ToolSpec> {
        self.tools.values().collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 工具目录 JSON（name / description / parameters），拼入规划提示词
    pub fn catalog_json(&self) -> String {
        serde_json::to_string_pretty(&self.list()).unwrap_or_else(|_| "[]".to_string())
    }
}

/// 注册时检查 schema 形状：顶层必须是 object，properties 为对象，required 为字符串数组
fn check_schema(schema: &Value) -> Result<(), String> {
    let obj = schema
        .as_object()
        .ok_or_else(|| "schema must be a JSON object".to_string())?;
    match obj.get("type").and_then(Value::as_str) {
        None | Some("object") => {}
        Some(other) => return Err(format!("top-level type must be 'object', got '{other}'")),
    }
    if let Some(props) = obj.get("properties") {
        if !props.is_object() {
            return Err("'properties' must be an object".to_string());
        }
    }
    if let Some(required) = obj.get("required") {
        let all_strings = required
            .as_array()
            .map(|r| r.iter().all(Value::is_string))
            .unwrap_or(false);
        if !all_strings {
            return Err("'required' must be an array of strings".to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;

    struct BadSchemaTool;

    #[async_trait]
    impl Tool for BadSchemaTool {
        fn name(&self) -> &str {
            "bad"
        }
        fn description(&self) -> &str {
            "schema is not an object"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({"type": "string"})
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            Ok(String::new())
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();

        let spec = registry.resolve("echo").expect("echo registered");
        assert_eq!(spec.name, "echo");
        assert_eq!(spec.required_params(), vec!["text"]);
        assert!(registry.resolve("missing").is_none());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        assert_eq!(
            registry.register(EchoTool),
            Err(RegistryError::Duplicate("echo".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let mut registry = ToolRegistry::new();
        let err = registry.register(BadSchemaTool).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSchema { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_catalog_json_lists_schema() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        let catalog: Value = serde_json::from_str(&registry.catalog_json()).unwrap();
        assert_eq!(catalog[0]["name"], "echo");
        assert_eq!(catalog[0]["parameters"]["required"][0], "text");
        assert!(catalog[0].get("handler").is_none());
    }
}
