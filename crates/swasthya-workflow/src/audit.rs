//! 访问审计
//!
//! 记录医生对患者档案的每一次访问尝试。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 审计动作
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AuditAction {
    ChallengeIssued,      // 签发验证码
    ChallengeReissued,    // 重发验证码
    VerificationSucceeded,
    VerificationFailed,
    VerificationLocked,   // 超过尝试次数
    RecordViewed,
    EntryAppended,
    AccessClosed,
}

impl AuditAction {
    pub fn name(&self) -> &'static str {
        match self {
            AuditAction::ChallengeIssued => "challenge_issued",
            AuditAction::ChallengeReissued => "challenge_reissued",
            AuditAction::VerificationSucceeded => "verification_succeeded",
            AuditAction::VerificationFailed => "verification_failed",
            AuditAction::VerificationLocked => "verification_locked",
            AuditAction::RecordViewed => "record_viewed",
            AuditAction::EntryAppended => "entry_appended",
            AuditAction::AccessClosed => "access_closed",
        }
    }
}

/// 审计事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEvent {
    pub id: Uuid,
    pub patient_id: String,
    pub action: AuditAction,
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// 内存审计记录，按发生顺序保存
#[derive(Debug, Default)]
pub struct AuditTrail {
    events: Vec<AuditEvent>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条审计事件并同步写入日志
    pub fn record(
        &mut self,
        patient_id: &str,
        action: AuditAction,
        detail: Option<String>,
    ) -> &AuditEvent {
        let event = AuditEvent {
            id: Uuid::new_v4(),
            patient_id: patient_id.to_string(),
            action,
            detail,
            occurred_at: Utc::now(),
        };

        tracing::info!(
            target: "swasthya::audit",
            "{} patient={} detail={}",
            action.name(),
            event.patient_id,
            event.detail.as_deref().unwrap_or("-")
        );

        self.events.push(event);
        &self.events[self.events.len() - 1]
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    /// 某位患者的全部审计事件
    pub fn for_patient(&self, patient_id: &str) -> Vec<&AuditEvent> {
        self.events
            .iter()
            .filter(|event| event.patient_id == patient_id)
            .collect()
    }

    /// 按动作统计
    pub fn count(&self, action: AuditAction) -> usize {
        self.events.iter().filter(|event| event.action == action).count()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
