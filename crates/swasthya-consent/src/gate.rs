//! 知情同意门控
//!
//! 验证码与单个患者绑定；校验通过后挑战即作废，
//! 之后的校验调用直接返回已确立的结果。

use crate::code::CodeGenerator;
use crate::delivery::CodeDelivery;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use swasthya_core::utils::{is_well_formed_code, mask_phone};
use swasthya_core::{Patient, Result, SwasthyaError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 挑战状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConsentStatus {
    Pending,  // 等待患者提供验证码
    Verified, // 已验证
}

/// 门控策略
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsentPolicy {
    /// 最大尝试次数，`None` 表示不锁定
    pub max_attempts: Option<u32>,
}

/// 一次性验证挑战
pub struct ConsentChallenge {
    id: Uuid,
    patient_id: String,
    masked_contact: String,
    expected_code: String,
    attempts: u32,
    verified: bool,
    issued_at: DateTime<Utc>,
}

impl ConsentChallenge {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 绑定的患者标识符
    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    /// 脱敏后的接收手机号
    pub fn masked_contact(&self) -> &str {
        &self.masked_contact
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    pub fn status(&self) -> ConsentStatus {
        if self.verified {
            ConsentStatus::Verified
        } else {
            ConsentStatus::Pending
        }
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

impl std::fmt::Debug for ConsentChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentChallenge")
            .field("id", &self.id)
            .field("patient_id", &self.patient_id)
            .field("masked_contact", &self.masked_contact)
            .field("expected_code", &"******")
            .field("attempts", &self.attempts)
            .field("verified", &self.verified)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// 逐字节比较，耗时与首个不同位置无关
fn codes_match(submitted: &str, expected: &str) -> bool {
    submitted.len() == expected.len()
        && submitted
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// 知情同意门控
pub struct ConsentGate {
    generator: Arc<dyn CodeGenerator>,
    delivery: Arc<dyn CodeDelivery>,
    policy: ConsentPolicy,
}

impl ConsentGate {
    /// 创建新的门控
    pub fn new(
        generator: Arc<dyn CodeGenerator>,
        delivery: Arc<dyn CodeDelivery>,
        policy: ConsentPolicy,
    ) -> Self {
        Self {
            generator,
            delivery,
            policy,
        }
    }

    pub fn policy(&self) -> &ConsentPolicy {
        &self.policy
    }

    /// 为患者签发新的挑战并投递验证码
    pub async fn issue_challenge(&self, patient: &Patient) -> Result<ConsentChallenge> {
        let code = self.generator.generate();
        if !is_well_formed_code(&code) {
            return Err(SwasthyaError::Internal(
                "code generator produced a malformed code".to_string(),
            ));
        }

        let challenge = ConsentChallenge {
            id: Uuid::new_v4(),
            patient_id: patient.id.clone(),
            masked_contact: mask_phone(&patient.phone),
            expected_code: code,
            attempts: 0,
            verified: false,
            issued_at: Utc::now(),
        };

        // 投递失败不影响挑战本身，医生可以选择重发
        if let Err(e) = self.delivery.deliver(patient, &challenge.expected_code).await {
            warn!(
                "Delivery of consent code for patient {} failed: {}",
                patient.id, e
            );
        }

        info!(
            "Consent challenge {} issued for patient {} via {}",
            challenge.id, challenge.patient_id, challenge.masked_contact
        );
        Ok(challenge)
    }

    /// 重新签发：同一患者，新验证码，尝试次数清零
    pub async fn reissue(
        &self,
        previous: &ConsentChallenge,
        patient: &Patient,
    ) -> Result<ConsentChallenge> {
        if previous.patient_id != patient.id {
            return Err(SwasthyaError::Validation(format!(
                "challenge {} is bound to a different patient",
                previous.id
            )));
        }

        debug!("Reissuing consent challenge {}", previous.id);
        self.issue_challenge(patient).await
    }

    /// 校验验证码
    ///
    /// 只接受恰好6位且与期望值一致的数字；任何多余字符都视为无效。
    pub fn verify(&self, challenge: &mut ConsentChallenge, submitted: &str) -> Result<ConsentStatus> {
        if challenge.verified {
            debug!("Challenge {} already verified", challenge.id);
            return Ok(ConsentStatus::Verified);
        }

        if let Some(max_attempts) = self.policy.max_attempts {
            if challenge.attempts >= max_attempts {
                warn!(
                    "Challenge {} locked after {} attempts",
                    challenge.id, challenge.attempts
                );
                return Err(SwasthyaError::TooManyAttempts {
                    attempts: challenge.attempts,
                });
            }
        }

        challenge.attempts += 1;
        if is_well_formed_code(submitted) && codes_match(submitted, &challenge.expected_code) {
            challenge.verified = true;
            info!(
                "Consent verified for patient {} (challenge {})",
                challenge.patient_id, challenge.id
            );
            return Ok(ConsentStatus::Verified);
        }

        warn!(
            "Invalid consent code for challenge {} (attempt {})",
            challenge.id, challenge.attempts
        );
        Err(SwasthyaError::InvalidCode)
    }
}

impl std::fmt::Debug for ConsentGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentGate")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FixedCodeGenerator, OutboxDelivery};
    use std::collections::BTreeSet;

    fn patient() -> Patient {
        Patient {
            id: "SW001234".to_string(),
            name: "Sunil Kumar".to_string(),
            age: 32,
            blood_group: "B+".to_string(),
            phone: "+91 98765 43210".to_string(),
            emergency_contact: "+91 87654 32109".to_string(),
            allergies: BTreeSet::new(),
        }
    }

    fn gate(max_attempts: Option<u32>) -> ConsentGate {
        ConsentGate::new(
            Arc::new(FixedCodeGenerator::new("123456")),
            Arc::new(OutboxDelivery::new()),
            ConsentPolicy { max_attempts },
        )
    }

    #[tokio::test]
    async fn test_verify_exact_code() {
        let gate = gate(None);
        let mut challenge = gate.issue_challenge(&patient()).await.unwrap();
        assert_eq!(challenge.status(), ConsentStatus::Pending);
        assert_eq!(challenge.masked_contact(), "********3210");

        assert!(matches!(gate.verify(&mut challenge, "654321"), Err(SwasthyaError::InvalidCode)));
        assert_eq!(gate.verify(&mut challenge, "123456").unwrap(), ConsentStatus::Verified);
        assert_eq!(challenge.attempts(), 2);
    }

    #[tokio::test]
    async fn test_verified_challenge_is_not_rechecked() {
        let gate = gate(None);
        let mut challenge = gate.issue_challenge(&patient()).await.unwrap();
        gate.verify(&mut challenge, "123456").unwrap();

        assert_eq!(gate.verify(&mut challenge, "000000").unwrap(), ConsentStatus::Verified);
        assert_eq!(challenge.attempts(), 1);
    }

    #[tokio::test]
    async fn test_any_six_characters_is_not_enough() {
        let gate = gate(None);
        let mut challenge = gate.issue_challenge(&patient()).await.unwrap();

        for code in ["abcdef", "12345 ", "1234567", "12345", " 123456", ""] {
            assert!(matches!(gate.verify(&mut challenge, code), Err(SwasthyaError::InvalidCode)));
        }
        assert!(!challenge.is_verified());
    }

    #[tokio::test]
    async fn test_lockout_is_distinct_from_invalid_code() {
        let gate = gate(Some(2));
        let mut challenge = gate.issue_challenge(&patient()).await.unwrap();

        assert!(matches!(gate.verify(&mut challenge, "000000"), Err(SwasthyaError::InvalidCode)));
        assert!(matches!(gate.verify(&mut challenge, "000001"), Err(SwasthyaError::InvalidCode)));
        assert!(matches!(
            gate.verify(&mut challenge, "123456"),
            Err(SwasthyaError::TooManyAttempts { attempts: 2 })
        ));
        assert!(!challenge.is_verified());
    }

    #[tokio::test]
    async fn test_reissue_resets_attempts() {
        let gate = gate(Some(1));
        let mut challenge = gate.issue_challenge(&patient()).await.unwrap();
        let _ = gate.verify(&mut challenge, "000000");

        let mut fresh = gate.reissue(&challenge, &patient()).await.unwrap();
        assert_ne!(fresh.id(), challenge.id());
        assert_eq!(fresh.attempts(), 0);
        assert_eq!(gate.verify(&mut fresh, "123456").unwrap(), ConsentStatus::Verified);
    }

    #[tokio::test]
    async fn test_debug_hides_expected_code() {
        let gate = gate(None);
        let challenge = gate.issue_challenge(&patient()).await.unwrap();
        let printed = format!("{:?}", challenge);
        assert!(!printed.contains("123456"));
    }

    #[tokio::test]
    async fn test_malformed_generator_output_is_rejected() {
        let gate = ConsentGate::new(
            Arc::new(FixedCodeGenerator::new("12ab56")),
            Arc::new(OutboxDelivery::new()),
            ConsentPolicy::default(),
        );
        assert!(matches!(
            gate.issue_challenge(&patient()).await,
            Err(SwasthyaError::Internal(_))
        ));
    }
}
