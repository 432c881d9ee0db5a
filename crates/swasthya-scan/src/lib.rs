//! # Swasthya扫描模块
//!
//! 通过摄像头或上传图片读取健康卡二维码，提取患者标识符：
//! - 扫描源：独占采集设备，保证任何退出路径都会释放
//! - 扫描状态机：纯函数形式的 `(状态, 事件) -> (状态, 副作用)` 转换
//! - 扫描会话：异步驱动状态机，丢弃取消后到达的过期结果
//! - 卡片载荷解析器与模拟摄像头

pub mod decoder;
pub mod session;
pub mod simulated;
pub mod source;
pub mod state_machine;

// 重新导出主要类型
pub use decoder::CardPayloadDecoder;
pub use session::{ScanOutcome, ScanSession, ScanSettings};
pub use simulated::SimulatedCamera;
pub use source::{CameraFacing, CaptureDevice, CodeDecoder, DeviceHandle, DeviceLease, Frame, ScanSource};
pub use state_machine::{ScanEffect, ScanEvent, ScanState, ScanStateMachine, Transition};
