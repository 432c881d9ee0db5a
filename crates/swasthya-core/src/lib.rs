//! # Swasthya Core
//!
//! 医生端核心模块，提供患者与病历的基础数据结构、统一错误定义和通用工具。

pub mod error;
pub mod models;
pub mod utils;

pub use error::{Result, ScanFailure, SwasthyaError};
pub use models::*;
