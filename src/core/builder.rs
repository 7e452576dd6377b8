//! 组件构建：由 AppConfig 创建 LLM、工具注册表、PlanGenerator、MemoryStore 并组装 Orchestrator
//!
//! 网关进程和集成测试共用同一套构建逻辑，保证注册的工具一致。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::llm::{
    create_openrouter_client, LlmClient, MockLlmClient, OpenAiClient, RetryConfig,
    RetryingLlmClient,
};
use crate::memory::{MemoryStore, SqliteMemoryStore};
use crate::plan::PlanGenerator;
use crate::tools::{
    EchoTool, LinkDetectTool, RegistryError, SummarizeTool, ToolRegistry, TranscriptClient,
    TranscriptFetchTool,
};

use super::error::AgentError;
use super::orchestrator::Orchestrator;

/// 根据配置与环境变量选择 LLM 后端（OpenRouter / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let base = cfg.llm.base_url.as_deref();

    let client = match provider.as_str() {
        "mock" => None,
        "openai" => match std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()) {
            Some(key) => {
                tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
                Some(OpenAiClient::new(base, &cfg.llm.model, &key))
            }
            None => None,
        },
        _ => {
            let client = create_openrouter_client(Some(&cfg.llm.model), base);
            if client.is_some() {
                tracing::info!("Using OpenRouter LLM ({})", cfg.llm.model);
            }
            client
        }
    };

    let Some(mut client) = client else {
        if provider != "mock" {
            tracing::warn!("No API key set for provider '{}', using Mock LLM", provider);
        }
        return Arc::new(MockLlmClient::new());
    };

    client = client.with_timeout(Duration::from_secs(cfg.llm.timeouts.request));
    if let Some(t) = cfg.llm.temperature {
        client = client.with_temperature(t);
    }

    Arc::new(RetryingLlmClient::new(
        Arc::new(client),
        RetryConfig {
            max_attempts: cfg.llm.retry.effective_attempts(),
            base_delay: Duration::from_millis(cfg.llm.retry.backoff_ms),
        },
    ))
}

fn registry_error(err: RegistryError) -> AgentError {
    AgentError::ConfigError(err.to_string())
}

/// Orchestrator 构建器
pub struct AgentBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self { config, llm: None }
    }

    /// 指定 LLM 客户端（测试时注入 Mock）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build_llm(&self) -> Arc<dyn LlmClient> {
        match &self.llm {
            Some(llm) => Arc::clone(llm),
            None => create_llm_from_config(&self.config),
        }
    }

    /// 注册内置工具：link_detect、transcript_fetch、summarize、echo
    pub fn build_tool_registry(&self, llm: Arc<dyn LlmClient>) -> Result<ToolRegistry, AgentError> {
        let tools_cfg = &self.config.tools;
        let transcripts = Arc::new(TranscriptClient::new(
            tools_cfg.transcript.base_url.clone(),
            tools_cfg.transcript.languages.clone(),
            tools_cfg.transcript.timeout_secs,
        ));

        let mut registry = ToolRegistry::new();
        registry.register(LinkDetectTool).map_err(registry_error)?;
        registry
            .register(TranscriptFetchTool::new(
                Arc::clone(&transcripts),
                tools_cfg.transcript.max_chars,
            ))
            .map_err(registry_error)?;
        registry
            .register(SummarizeTool::new(
                llm,
                transcripts,
                tools_cfg.summarize.max_input_chars,
            ))
            .map_err(registry_error)?;
        registry.register(EchoTool).map_err(registry_error)?;

        tracing::info!(tools = ?registry.tool_names(), "tool registry ready");
        Ok(registry)
    }

    /// 规划提示词：配置文件指定的路径优先，读取失败时用内置提示词
    pub fn build_planner(&self, llm: Arc<dyn LlmClient>) -> PlanGenerator {
        let planner = PlanGenerator::new(llm).with_max_steps(self.config.planner.max_steps);
        match &self.config.planner.system_prompt_path {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(prompt) if !prompt.trim().is_empty() => planner.with_system_prompt(prompt),
                Ok(_) => planner,
                Err(e) => {
                    tracing::warn!("Planner prompt {} unreadable ({}), using built-in", path.display(), e);
                    planner
                }
            },
            None => planner,
        }
    }

    pub async fn build_memory(&self) -> Result<Arc<dyn MemoryStore>, AgentError> {
        let path: &Path = &self.config.memory.db_path;
        let store = SqliteMemoryStore::open(path).await?;
        tracing::info!("Memory store opened at {}", path.display());
        Ok(Arc::new(store))
    }

    /// 用给定的 MemoryStore 组装 Orchestrator
    pub fn build_with_memory(&self, memory: Arc<dyn MemoryStore>) -> Result<Orchestrator, AgentError> {
        let llm = self.build_llm();
        let registry = Arc::new(self.build_tool_registry(Arc::clone(&llm))?);
        let planner = self.build_planner(llm);
        Ok(Orchestrator::new(
            registry,
            planner,
            memory,
            self.config.tools.tool_timeout_secs,
        ))
    }

    pub async fn build(&self) -> Result<Orchestrator, AgentError> {
        let memory = self.build_memory().await?;
        self.build_with_memory(memory)
    }
}
