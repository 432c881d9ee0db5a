//! 错误定义模块

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Swasthya系统统一错误类型
#[derive(Error, Debug)]
pub enum SwasthyaError {
    #[error("摄像头权限被拒绝: {0}")]
    PermissionDenied(String),

    #[error("采集设备不可用: {0}")]
    DeviceUnavailable(String),

    #[error("未识别到二维码")]
    NoCodeFound,

    #[error("患者未找到: {0}")]
    PatientNotFound(String),

    #[error("验证码无效")]
    InvalidCode,

    #[error("验证尝试次数过多: 已尝试 {attempts} 次")]
    TooManyAttempts { attempts: u32 },

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("需要患者知情同意: {0}")]
    ConsentRequired(String),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl SwasthyaError {
    /// 扫描失败原因对应的错误
    pub fn from_scan_failure(reason: &ScanFailure, detail: impl Into<String>) -> Self {
        match reason {
            ScanFailure::PermissionDenied => SwasthyaError::PermissionDenied(detail.into()),
            ScanFailure::DeviceUnavailable => SwasthyaError::DeviceUnavailable(detail.into()),
            ScanFailure::NoCodeFound => SwasthyaError::NoCodeFound,
        }
    }

    /// 对应的扫描失败原因，非扫描类错误返回 `None`
    pub fn scan_failure(&self) -> Option<ScanFailure> {
        match self {
            SwasthyaError::PermissionDenied(_) => Some(ScanFailure::PermissionDenied),
            SwasthyaError::DeviceUnavailable(_) => Some(ScanFailure::DeviceUnavailable),
            SwasthyaError::NoCodeFound => Some(ScanFailure::NoCodeFound),
            _ => None,
        }
    }
}

/// 扫描终止原因
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ScanFailure {
    PermissionDenied,  // 用户拒绝摄像头权限
    DeviceUnavailable, // 设备不存在或被占用
    NoCodeFound,       // 上传图片中没有可识别的二维码
}

impl std::fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanFailure::PermissionDenied => write!(f, "permission denied"),
            ScanFailure::DeviceUnavailable => write!(f, "device unavailable"),
            ScanFailure::NoCodeFound => write!(f, "no code found"),
        }
    }
}

/// Swasthya系统统一结果类型
pub type Result<T> = std::result::Result<T, SwasthyaError>;
