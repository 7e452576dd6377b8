//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MANUCLAW__*` 覆盖（双下划线表示嵌套，如 `MANUCLAW__LLM__PROVIDER=mock`）。
//! API Key 不放在配置文件里，只从环境变量读取。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewaySection,
    pub llm: LlmSection,
    pub planner: PlannerSection,
    pub tools: ToolsSection,
    pub memory: MemorySection,
}

/// [gateway] 段：监听地址与连接上限
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySection {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// 关闭时等待进行中会话收尾的最长时间（秒）
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8765".to_string()
}

fn default_max_connections() -> usize {
    256
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_connections: default_max_connections(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

/// [llm] 段：后端选择、模型、超时与重试
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openrouter / openai / mock；缺少对应 API Key 时回退到 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
    #[serde(default)]
    pub retry: LlmRetrySection,
}

fn default_provider() -> String {
    "openrouter".to_string()
}

fn default_model() -> String {
    crate::llm::openrouter::OPENROUTER_DEFAULT_MODEL.to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: None,
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

/// [llm.retry] 段：仅对传输层错误重试，总尝试次数上限为 2
#[derive(Debug, Clone, Deserialize)]
pub struct LlmRetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

pub const MAX_LLM_ATTEMPTS: u32 = 2;

fn default_max_attempts() -> u32 {
    MAX_LLM_ATTEMPTS
}

fn default_backoff_ms() -> u64 {
    500
}

impl LlmRetrySection {
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.clamp(1, MAX_LLM_ATTEMPTS)
    }
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// [planner] 段
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerSection {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// 自定义规划提示词文件；不存在时使用内置提示词
    pub system_prompt_path: Option<PathBuf>,
}

fn default_max_steps() -> usize {
    crate::plan::DEFAULT_MAX_STEPS
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            system_prompt_path: None,
        }
    }
}

/// [tools] 段：单次调用超时与内置工具参数
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub transcript: TranscriptSection,
    #[serde(default)]
    pub summarize: SummarizeSection,
}

fn default_tool_timeout_secs() -> u64 {
    60
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            transcript: TranscriptSection::default(),
            summarize: SummarizeSection::default(),
        }
    }
}

/// [tools.transcript] 段：字幕服务地址、语言优先级
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptSection {
    #[serde(default = "default_transcript_url")]
    pub base_url: String,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default = "default_transcript_timeout_secs")]
    pub timeout_secs: u64,
    /// transcript_fetch 返回文本的最大字符数
    #[serde(default = "default_transcript_max_chars")]
    pub max_chars: usize,
}

fn default_transcript_url() -> String {
    crate::tools::DEFAULT_TIMEDTEXT_URL.to_string()
}

fn default_languages() -> Vec<String> {
    vec!["en".into(), "en-US".into(), "fr".into(), "fr-FR".into()]
}

fn default_transcript_timeout_secs() -> u64 {
    15
}

fn default_transcript_max_chars() -> usize {
    20_000
}

impl Default for TranscriptSection {
    fn default() -> Self {
        Self {
            base_url: default_transcript_url(),
            languages: default_languages(),
            timeout_secs: default_transcript_timeout_secs(),
            max_chars: default_transcript_max_chars(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummarizeSection {
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

fn default_max_input_chars() -> usize {
    12_000
}

impl Default for SummarizeSection {
    fn default() -> Self {
        Self {
            max_input_chars: default_max_input_chars(),
        }
    }
}

/// [memory] 段：SQLite 文件路径、历史查询默认条数
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("manuclaw.db")
}

fn default_recent_limit() -> usize {
    50
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            recent_limit: default_recent_limit(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 MANUCLAW__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MANUCLAW__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!("Config file {} not found, ignored", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MANUCLAW")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("tools.transcript.languages")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.gateway.bind_addr, "127.0.0.1:8765");
        assert_eq!(cfg.gateway.max_connections, 256);
        assert_eq!(cfg.gateway.shutdown_timeout_secs, 10);
        assert_eq!(cfg.llm.provider, "openrouter");
        assert_eq!(cfg.llm.retry.effective_attempts(), 2);
        assert_eq!(cfg.planner.max_steps, 16);
        assert_eq!(cfg.tools.tool_timeout_secs, 60);
        assert_eq!(cfg.tools.transcript.languages, vec!["en", "en-US", "fr", "fr-FR"]);
        assert_eq!(cfg.tools.summarize.max_input_chars, 12_000);
        assert_eq!(cfg.memory.db_path, PathBuf::from("manuclaw.db"));
    }

    #[test]
    fn test_retry_attempts_capped() {
        let retry = LlmRetrySection {
            max_attempts: 5,
            backoff_ms: 10,
        };
        assert_eq!(retry.effective_attempts(), 2);
        let retry = LlmRetrySection {
            max_attempts: 0,
            backoff_ms: 10,
        };
        assert_eq!(retry.effective_attempts(), 1);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[gateway]\nbind_addr = \"0.0.0.0:9999\"\n\n[llm]\nprovider = \"mock\"\n\n[tools.transcript]\ntimeout_secs = 3"
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.gateway.bind_addr, "0.0.0.0:9999");
        assert_eq!(cfg.gateway.max_connections, 256);
        assert_eq!(cfg.gateway.shutdown_timeout_secs, 10);
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.tools.transcript.timeout_secs, 3);
        assert_eq!(cfg.tools.transcript.languages.len(), 4);
        assert_eq!(cfg.memory.recent_limit, 50);
    }
}
