//! # Swasthya管理模块
//!
//! 提供配置加载、校验、保存以及日志订阅器初始化等运维功能

pub mod config;
pub mod logging;

pub use config::{
    ClinicianConfig, ConfigManager, ConfigValidator, ConsentConfig, LogFormat, LoggingConfig,
    RecordsConfig, ScannerConfig, SwasthyaConfig,
};
pub use logging::{build_filter, init_tracing};
