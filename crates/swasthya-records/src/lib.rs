//! # Swasthya病历模块
//!
//! 负责患者档案的存储、检索与病史追加：
//! - 病历存储：按时间倒序保存病史，只允许追加
//! - 患者检索：按标识符精确查找或按关键字模糊搜索
//! - 示例数据：内置演示用患者目录

pub mod resolver;
pub mod sample;
pub mod store;

pub use resolver::PatientResolver;
pub use sample::sample_records;
pub use store::{InMemoryRecordStore, PatientDirectory, RecordStore};
