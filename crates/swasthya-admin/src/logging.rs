//! 日志订阅器初始化

use crate::config::{LogFormat, LoggingConfig};
use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// 解析日志级别指令，如 `info` 或 `warn,swasthya_scan=debug`
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level).with_context(|| format!("Invalid log level directive: {}", level))
}

/// 按配置安装全局订阅器，日志写到标准错误
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(&config.level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_writer(std::io::stderr);

    let installed = match config.format {
        LogFormat::Full => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}
