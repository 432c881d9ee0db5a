//! 扫描状态机
//!
//! 纯函数形式的状态转换：`(状态, 事件) -> (状态, 副作用)`。
//! 设备申请、读帧等副作用由扫描会话执行，这里只描述需要做什么。

use serde::{Deserialize, Serialize};
use swasthya_core::{Result, ScanFailure, SwasthyaError};

/// 扫描状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScanState {
    Idle,                              // 空闲
    Initializing,                      // 正在申请摄像头
    Scanning,                          // 逐帧识别中
    Detected { candidate: String },    // 已识别，等待稳定确认
    Processing { identifier: String }, // 确认完成，提交中
    Success { identifier: String },    // 成功，标识符可用
    Error { reason: ScanFailure },     // 失败
}

impl ScanState {
    /// 该状态下是否持有采集设备
    pub fn holds_device(&self) -> bool {
        matches!(
            self,
            ScanState::Scanning | ScanState::Detected { .. } | ScanState::Processing { .. }
        )
    }

    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanState::Success { .. } | ScanState::Error { .. })
    }

    /// 成功状态下的标识符
    pub fn identifier(&self) -> Option<&str> {
        match self {
            ScanState::Success { identifier } => Some(identifier),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScanState::Idle => "Idle",
            ScanState::Initializing => "Initializing",
            ScanState::Scanning => "Scanning",
            ScanState::Detected { .. } => "Detected",
            ScanState::Processing { .. } => "Processing",
            ScanState::Success { .. } => "Success",
            ScanState::Error { .. } => "Error",
        }
    }
}

/// 扫描事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScanEvent {
    Start,
    DeviceAcquired,
    AcquireFailed(ScanFailure),
    FrameDecoded(Option<String>),
    SettleElapsed { confirmation: Option<String> },
    Committed,
    ImageDecoded(String),
    ImageRejected,
    Cancel,
    Reset,
}

impl ScanEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ScanEvent::Start => "Start",
            ScanEvent::DeviceAcquired => "DeviceAcquired",
            ScanEvent::AcquireFailed(_) => "AcquireFailed",
            ScanEvent::FrameDecoded(_) => "FrameDecoded",
            ScanEvent::SettleElapsed { .. } => "SettleElapsed",
            ScanEvent::Committed => "Committed",
            ScanEvent::ImageDecoded(_) => "ImageDecoded",
            ScanEvent::ImageRejected => "ImageRejected",
            ScanEvent::Cancel => "Cancel",
            ScanEvent::Reset => "Reset",
        }
    }
}

/// 状态转换产生的副作用
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScanEffect {
    AcquireDevice,    // 申请摄像头
    ReleaseDevice,    // 释放摄像头
    DecodeFrame,      // 读取下一帧
    StartSettle,      // 开始稳定等待
    Deliver(String),  // 交付标识符
}

/// 一次状态转换的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: ScanState,
    pub effects: Vec<ScanEffect>,
}

impl Transition {
    fn to(state: ScanState, effects: Vec<ScanEffect>) -> Self {
        Self { state, effects }
    }
}

/// 扫描状态机
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanStateMachine;

impl ScanStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        Self
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: &ScanState, event: &ScanEvent) -> bool {
        self.transition(from, event).is_ok()
    }

    /// 执行状态转换
    pub fn transition(&self, from: &ScanState, event: &ScanEvent) -> Result<Transition> {
        use ScanEffect::*;

        let next = match (from, event) {
            // 取消与重置在任何状态下都回到空闲，持有的设备必须释放
            (_, ScanEvent::Cancel) | (_, ScanEvent::Reset) => {
                let effects = if from.holds_device() {
                    vec![ReleaseDevice]
                } else {
                    Vec::new()
                };
                Transition::to(ScanState::Idle, effects)
            }

            (ScanState::Idle, ScanEvent::Start) => {
                Transition::to(ScanState::Initializing, vec![AcquireDevice])
            }
            (ScanState::Initializing, ScanEvent::DeviceAcquired) => {
                Transition::to(ScanState::Scanning, vec![DecodeFrame])
            }
            (ScanState::Initializing, ScanEvent::AcquireFailed(reason)) => Transition::to(
                ScanState::Error {
                    reason: reason.clone(),
                },
                Vec::new(),
            ),

            (ScanState::Scanning, ScanEvent::FrameDecoded(decoded)) => {
                match decoded.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
                    Some(candidate) => Transition::to(
                        ScanState::Detected {
                            candidate: candidate.to_string(),
                        },
                        vec![StartSettle],
                    ),
                    None => Transition::to(ScanState::Scanning, vec![DecodeFrame]),
                }
            }

            // 稳定期后再读一帧，与首次识别一致才提交
            (ScanState::Detected { candidate }, ScanEvent::SettleElapsed { confirmation }) => {
                let confirmed = confirmation
                    .as_deref()
                    .map(str::trim)
                    .is_some_and(|id| id == candidate);
                if confirmed {
                    Transition::to(
                        ScanState::Processing {
                            identifier: candidate.clone(),
                        },
                        Vec::new(),
                    )
                } else {
                    Transition::to(ScanState::Scanning, vec![DecodeFrame])
                }
            }

            (ScanState::Processing { identifier }, ScanEvent::Committed) => Transition::to(
                ScanState::Success {
                    identifier: identifier.clone(),
                },
                vec![ReleaseDevice, Deliver(identifier.clone())],
            ),

            (ScanState::Idle, ScanEvent::ImageDecoded(identifier)) => {
                let identifier = identifier.trim();
                if identifier.is_empty() {
                    Transition::to(
                        ScanState::Error {
                            reason: ScanFailure::NoCodeFound,
                        },
                        Vec::new(),
                    )
                } else {
                    Transition::to(
                        ScanState::Success {
                            identifier: identifier.to_string(),
                        },
                        vec![Deliver(identifier.to_string())],
                    )
                }
            }
            (ScanState::Idle, ScanEvent::ImageRejected) => Transition::to(
                ScanState::Error {
                    reason: ScanFailure::NoCodeFound,
                },
                Vec::new(),
            ),

            _ => {
                return Err(SwasthyaError::InvalidStateTransition {
                    from: from.name().to_string(),
                    event: event.name().to_string(),
                })
            }
        };

        Ok(next)
    }

    /// 获取所有可能的状态名称
    pub fn get_all_states() -> Vec<&'static str> {
        vec![
            "Idle",
            "Initializing",
            "Scanning",
            "Detected",
            "Processing",
            "Success",
            "Error",
        ]
    }
}
