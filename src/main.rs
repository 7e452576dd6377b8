//! Manuclaw Gateway - Agent 编排网关
//!
//! 启动 WebSocket 网关：接收请求，规划工具调用，逐步执行并实时推送结果。
//!
//! 运行方式：
//! ```bash
//! cargo run --bin manuclaw-gateway -- [config.toml]
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use manuclaw::config::{load_config, AppConfig};
use manuclaw::core::AgentBuilder;
use manuclaw::gateway::{Gateway, GatewayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    manuclaw::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let orchestrator = AgentBuilder::new(cfg.clone())
        .build()
        .await
        .context("Failed to build orchestrator")?;

    let gateway = Gateway::new(GatewayConfig::from(&cfg), Arc::new(orchestrator));
    let addr = gateway.start().await.context("Failed to start gateway")?;

    tracing::info!("Manuclaw gateway ready on ws://{}", addr);
    tracing::info!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    tracing::info!("Shutting down gateway...");
    gateway.stop().await;

    Ok(())
}
