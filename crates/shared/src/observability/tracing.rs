//! 日志初始化
//!
//! 基于 tracing-subscriber 组合环境过滤器与格式化输出层，
//! 支持人类可读格式（本地开发）和 JSON 格式（日志采集）。

use anyhow::Result;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use super::ObservabilityConfig;

/// 初始化全局 tracing subscriber
///
/// 重复初始化会返回错误（全局 subscriber 只能设置一次）。
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let env_filter = build_env_filter(&config.log_level);

    let fmt_layer = if config.json_logs {
        fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// 构建环境过滤器：RUST_LOG 优先，其次配置值，都无效时回退到 info
fn build_env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
