//! 验证码生成

use rand::Rng;
use swasthya_core::utils::CONSENT_CODE_LENGTH;

/// 验证码生成器
pub trait CodeGenerator: Send + Sync {
    /// 生成一个6位数字验证码
    fn generate(&self) -> String;
}

/// 随机验证码
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let value: u32 = rand::thread_rng().gen_range(0..1_000_000);
        format!("{:0width$}", value, width = CONSENT_CODE_LENGTH)
    }
}

/// 固定验证码，用于演示环境
#[derive(Debug, Clone)]
pub struct FixedCodeGenerator {
    code: String,
}

impl FixedCodeGenerator {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl CodeGenerator for FixedCodeGenerator {
    fn generate(&self) -> String {
        self.code.clone()
    }
}
