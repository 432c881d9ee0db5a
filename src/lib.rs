//! # Swasthya
//!
//! 医生端病历访问：扫描或检索患者身份，患者提供一次性验证码后
//! 才能查看病史或追加就诊记录。

pub use swasthya_admin as admin;
pub use swasthya_consent as consent;
pub use swasthya_core as core;
pub use swasthya_records as records;
pub use swasthya_scan as scan;
pub use swasthya_workflow as workflow;

pub use swasthya_core::{Result, SwasthyaError};
pub use swasthya_workflow::AccessWorkflow;
