//! 配置管理
//!
//! 默认值 < TOML配置文件 < `SWASTHYA_*` 环境变量，加载后经过规则校验。

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use swasthya_consent::ConsentPolicy;
use swasthya_core::{ClinicianContext, DEFAULT_TREATMENT};
use swasthya_scan::{CameraFacing, ScanSettings};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    /// 配置数据
    config: Arc<RwLock<SwasthyaConfig>>,
    /// 配置文件路径，未指定时只使用默认值与环境变量
    config_path: Option<PathBuf>,
    /// 配置验证器
    validator: ConfigValidator,
}

/// Swasthya完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SwasthyaConfig {
    /// 扫描配置
    pub scanner: ScannerConfig,
    /// 知情同意配置
    pub consent: ConsentConfig,
    /// 病历配置
    pub records: RecordsConfig,
    /// 当前医生
    pub clinician: ClinicianConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 扫描配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScannerConfig {
    /// 帧间隔（毫秒）
    pub frame_interval_ms: u64,
    /// 检测到二维码后的稳定时间（毫秒）
    pub settle_period_ms: u64,
    /// 默认摄像头朝向
    pub facing: CameraFacing,
}

impl ScannerConfig {
    pub fn to_settings(&self) -> ScanSettings {
        ScanSettings {
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            settle_period: Duration::from_millis(self.settle_period_ms),
            facing: self.facing,
        }
    }
}

/// 知情同意配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsentConfig {
    /// 最大尝试次数，不设置则不锁定
    pub max_attempts: Option<u32>,
}

impl ConsentConfig {
    pub fn to_policy(&self) -> ConsentPolicy {
        ConsentPolicy {
            max_attempts: self.max_attempts,
        }
    }
}

/// 病历配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecordsConfig {
    /// 患者目录JSON文件，不设置则使用内置示例目录
    pub directory_path: Option<PathBuf>,
    /// 未填写治疗方案时的默认文本
    pub treatment_placeholder: String,
}

/// 当前医生配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClinicianConfig {
    pub name: String,
    pub facility: String,
}

impl ClinicianConfig {
    pub fn to_context(&self) -> ClinicianContext {
        ClinicianContext::new(self.name.clone(), self.facility.clone())
    }
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别，支持 `EnvFilter` 指令语法
    pub level: String,
    /// 日志格式
    pub format: LogFormat,
    /// 是否输出ANSI颜色
    pub ansi: bool,
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    /// 验证规则
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&SwasthyaConfig) -> Result<()>,
}

impl ConfigManager {
    /// 加载配置；指定的配置文件必须存在
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Self::load_config(config_path)?;
        Self::from_config(config, config_path.map(Path::to_path_buf))
    }

    /// 使用已有配置创建管理器
    pub fn from_config(config: SwasthyaConfig, config_path: Option<PathBuf>) -> Result<Self> {
        let validator = ConfigValidator::new();
        validator.validate(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
            validator,
        })
    }

    /// 依次叠加默认值、配置文件与环境变量
    fn load_config(config_path: Option<&Path>) -> Result<SwasthyaConfig> {
        let defaults = Config::try_from(&SwasthyaConfig::default())
            .context("Failed to build default configuration")?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("SWASTHYA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration sources")?;

        let config: SwasthyaConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        match config_path {
            Some(path) => info!("Configuration loaded from: {}", path.display()),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }

    /// 获取配置
    pub async fn get_config(&self) -> SwasthyaConfig {
        self.config.read().await.clone()
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// 更新配置，校验通过后写回配置文件
    pub async fn update_config(&self, new_config: SwasthyaConfig) -> Result<()> {
        self.validator.validate(&new_config)?;

        {
            let mut config = self.config.write().await;
            *config = new_config;
        }

        if self.config_path.is_some() {
            self.save_config().await?;
        }

        info!("Configuration updated successfully");
        Ok(())
    }

    /// 保存配置到文件
    pub async fn save_config(&self) -> Result<()> {
        let path = self
            .config_path
            .as_ref()
            .context("No configuration file path to save to")?;

        let config_str = {
            let config = self.config.read().await;
            toml::to_string_pretty(&*config).context("Failed to serialize configuration")?
        };

        tokio::fs::write(path, config_str)
            .await
            .with_context(|| format!("Failed to write configuration file {}", path.display()))?;

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// 重新加载配置
    pub async fn reload_config(&self) -> Result<()> {
        let new_config = Self::load_config(self.config_path.as_deref())?;
        self.validator.validate(&new_config)?;

        let mut config = self.config.write().await;
        *config = new_config;
        debug!("Configuration reloaded");
        Ok(())
    }

    /// 按点分路径读取单个配置值，如 `scanner.settle_period_ms`
    pub async fn get_value<T>(&self, path: &str) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let config_json = {
            let config = self.config.read().await;
            serde_json::to_value(&*config).context("Failed to serialize config to JSON")?
        };

        let mut current = &config_json;
        for part in path.split('.') {
            current = current
                .as_object()
                .and_then(|map| map.get(part))
                .with_context(|| format!("Configuration path not found: {}", path))?;
        }

        serde_json::from_value(current.clone())
            .with_context(|| format!("Failed to deserialize configuration value at {}", path))
    }

    /// 验证配置
    pub async fn validate_config(&self) -> Result<()> {
        let config = self.config.read().await;
        self.validator.validate(&config)
    }
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "scanner.frame_interval_ms",
                validator: |config| {
                    if config.scanner.frame_interval_ms == 0 {
                        anyhow::bail!("frame interval must be at least 1ms");
                    }
                    Ok(())
                },
            },
            ValidationRule {
                field_path: "consent.max_attempts",
                validator: |config| {
                    if config.consent.max_attempts == Some(0) {
                        anyhow::bail!("max attempts must be positive when set");
                    }
                    Ok(())
                },
            },
            ValidationRule {
                field_path: "records.treatment_placeholder",
                validator: |config| {
                    if config.records.treatment_placeholder.trim().is_empty() {
                        anyhow::bail!("treatment placeholder must not be empty");
                    }
                    Ok(())
                },
            },
            ValidationRule {
                field_path: "clinician",
                validator: |config| {
                    if config.clinician.name.trim().is_empty()
                        || config.clinician.facility.trim().is_empty()
                    {
                        anyhow::bail!("clinician name and facility must not be empty");
                    }
                    Ok(())
                },
            },
            ValidationRule {
                field_path: "logging.level",
                validator: |config| crate::logging::build_filter(&config.logging.level).map(|_| ()),
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &SwasthyaConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(e.context(format!("Invalid configuration value {}", rule.field_path)));
            }
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 100,
            settle_period_ms: 500,
            facing: CameraFacing::Back,
        }
    }
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            directory_path: None,
            treatment_placeholder: DEFAULT_TREATMENT.to_string(),
        }
    }
}

impl Default for ClinicianConfig {
    fn default() -> Self {
        Self {
            name: "Dr. Rajeev Nair".to_string(),
            facility: "Primary Health Center, Kochi".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Full,
            ansi: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SwasthyaConfig::default();
        assert!(ConfigValidator::new().validate(&config).is_ok());
        assert_eq!(config.scanner.to_settings().settle_period, Duration::from_millis(500));
        assert_eq!(config.consent.to_policy().max_attempts, None);
    }

    #[test]
    fn test_zero_frame_interval_is_rejected() {
        let mut config = SwasthyaConfig::default();
        config.scanner.frame_interval_ms = 0;
        assert!(ConfigValidator::new().validate(&config).is_err());
    }

    #[test]
    fn test_zero_max_attempts_is_rejected() {
        let mut config = SwasthyaConfig::default();
        config.consent.max_attempts = Some(0);
        assert!(ConfigValidator::new().validate(&config).is_err());

        config.consent.max_attempts = Some(3);
        assert!(ConfigValidator::new().validate(&config).is_ok());
    }

    #[test]
    fn test_blank_clinician_is_rejected() {
        let mut config = SwasthyaConfig::default();
        config.clinician.facility = "  ".to_string();
        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert!(format!("{:#}", err).contains("clinician"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: SwasthyaConfig = toml::from_str(
            r#"
            [scanner]
            settle_period_ms = 250

            [logging]
            format = "compact"
            "#,
        )
        .unwrap();

        assert_eq!(config.scanner.settle_period_ms, 250);
        assert_eq!(config.scanner.frame_interval_ms, 100);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.records.treatment_placeholder, DEFAULT_TREATMENT);
    }

    #[tokio::test]
    async fn test_get_value_by_path() {
        let manager = ConfigManager::from_config(SwasthyaConfig::default(), None).unwrap();
        let settle: u64 = manager.get_value("scanner.settle_period_ms").await.unwrap();
        assert_eq!(settle, 500);

        let facing: CameraFacing = manager.get_value("scanner.facing").await.unwrap();
        assert_eq!(facing, CameraFacing::Back);

        assert!(manager.get_value::<u64>("scanner.missing").await.is_err());
    }

    #[tokio::test]
    async fn test_save_without_path_fails() {
        let manager = ConfigManager::from_config(SwasthyaConfig::default(), None).unwrap();
        assert!(manager.save_config().await.is_err());
    }
}
