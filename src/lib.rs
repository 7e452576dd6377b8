//! Manuclaw - Agent 编排网关
//!
//! 把一条自然语言请求拆解为有序的工具调用计划，逐步执行、持久化每一步的结果，
//! 并通过 WebSocket 实时推送进度。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 会话状态机、Orchestrator 主控循环、组件构建
//! - **gateway**: WebSocket 网关（会话传输层）
//! - **llm**: 补全服务客户端抽象与实现（OpenAI 兼容 / OpenRouter / Mock）
//! - **memory**: 步骤记录的持久化（SQLite / 内存）
//! - **observability**: tracing 初始化
//! - **plan**: 计划模型与 PlanGenerator
//! - **tools**: 工具注册表、调度器与内置工具

pub mod config;
pub mod core;
pub mod gateway;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod plan;
pub mod tools;
