//! 验证码投递
//!
//! 实际短信发送由外部通知服务完成，对核心来说是发出即忘的调用。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use swasthya_core::utils::mask_phone;
use swasthya_core::{Patient, Result};
use tracing::info;

/// 验证码投递提供者
#[async_trait]
pub trait CodeDelivery: Send + Sync {
    /// 将验证码发送到患者登记的联系方式
    async fn deliver(&self, patient: &Patient, code: &str) -> Result<()>;
}

/// 在终端模拟短信，供命令行演示使用
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleDelivery;

#[async_trait]
impl CodeDelivery for ConsoleDelivery {
    async fn deliver(&self, patient: &Patient, code: &str) -> Result<()> {
        let masked = mask_phone(&patient.phone);
        info!("Simulated SMS sent to {}", masked);
        eprintln!("[短信 -> {}] Swasthya 验证码: {}", masked, code);
        Ok(())
    }
}

/// 一条已投递的验证码
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredCode {
    pub patient_id: String,
    pub phone: String,
    pub code: String,
    pub sent_at: DateTime<Utc>,
}

/// 记录所有投递的发件箱，测试与演示中代替患者手机
#[derive(Debug, Default)]
pub struct OutboxDelivery {
    sent: Mutex<Vec<DeliveredCode>>,
}

impl OutboxDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// 最近一次发给该患者的验证码
    pub fn latest_code_for(&self, patient_id: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .rev()
            .find(|message| message.patient_id == patient_id)
            .map(|message| message.code.clone())
    }

    pub fn sent(&self) -> Vec<DeliveredCode> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl CodeDelivery for OutboxDelivery {
    async fn deliver(&self, patient: &Patient, code: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(DeliveredCode {
                patient_id: patient.id.clone(),
                phone: patient.phone.clone(),
                code: code.to_string(),
                sent_at: Utc::now(),
            });
        Ok(())
    }
}
