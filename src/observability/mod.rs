//! 可观测性：tracing 订阅器初始化
//!
//! 默认级别 `manuclaw=info`，可通过 RUST_LOG 覆盖（如 `RUST_LOG=manuclaw=debug`）。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_FILTER: &str = "manuclaw=info";

/// 初始化全局订阅器；重复调用（如测试里）时静默忽略
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}
