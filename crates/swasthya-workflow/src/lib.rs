//! # Swasthya访问工作流模块
//!
//! 将扫描、检索、知情同意与病历存储串成医生的完整访问流程：
//! - 访问工作流：选择患者、签发验证码、校验后才允许读写病历
//! - 审计记录：每一步访问都留下可追溯的审计事件

pub mod audit;
pub mod engine;

// 重新导出主要类型
pub use audit::{AuditAction, AuditEvent, AuditTrail};
pub use engine::AccessWorkflow;
