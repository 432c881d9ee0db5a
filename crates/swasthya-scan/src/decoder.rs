//! 健康卡二维码载荷解析
//!
//! 卡片二维码携带纯文本载荷，可以是裸标识符 `SW001234`，
//! 也可以是 `swasthya://patient/SW001234` 形式的链接。
//! 光学解码由外部组件完成，这里只负责从载荷中提取标识符。

use crate::source::{CodeDecoder, Frame};
use async_trait::async_trait;
use regex::Regex;
use swasthya_core::{Result, SwasthyaError};

/// 默认载荷格式
pub const DEFAULT_PAYLOAD_PATTERN: &str =
    r"^(?:swasthya://patient/)?([A-Za-z0-9][A-Za-z0-9_-]{0,63})$";

/// 健康卡载荷解析器
#[derive(Debug, Clone)]
pub struct CardPayloadDecoder {
    pattern: Regex,
}

impl CardPayloadDecoder {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_PAYLOAD_PATTERN).expect("default payload pattern is valid"),
        }
    }

    /// 使用自定义载荷格式，第一个捕获组为标识符
    pub fn with_pattern(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| SwasthyaError::Config(format!("invalid payload pattern: {}", e)))?;
        if pattern.captures_len() < 2 {
            return Err(SwasthyaError::Config(
                "payload pattern must capture the identifier".to_string(),
            ));
        }
        Ok(Self { pattern })
    }

    /// 解析载荷，返回标识符
    pub fn parse(&self, payload: &[u8]) -> Option<String> {
        let text = std::str::from_utf8(payload).ok()?.trim();
        if text.is_empty() {
            return None;
        }

        self.pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

impl Default for CardPayloadDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodeDecoder for CardPayloadDecoder {
    async fn decode_frame(&self, frame: &Frame) -> Option<String> {
        self.parse(&frame.data)
    }

    async fn decode_image(&self, bytes: &[u8]) -> Option<String> {
        self.parse(bytes)
    }
}
