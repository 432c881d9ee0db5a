//! 访问工作流引擎
//!
//! 协调患者检索、知情同意门控与病历存储。同一时刻最多存在一个
//! `(患者, 挑战)` 组合；只有绑定到同一患者且已验证的挑战才能读写病历。

use crate::audit::{AuditAction, AuditTrail};
use std::sync::Arc;
use swasthya_consent::{ConsentChallenge, ConsentGate, ConsentStatus};
use swasthya_core::{
    ClinicianContext, HistoryEntry, NewHistoryEntry, Patient, PatientRecord, PatientSummary,
    Result, SwasthyaError,
};
use swasthya_records::{InMemoryRecordStore, PatientResolver, RecordStore};
use swasthya_scan::ScanSession;

/// 当前选中的患者及其挑战
#[derive(Debug)]
struct ActiveAccess {
    patient: Patient,
    challenge: ConsentChallenge,
}

/// 访问工作流
///
/// 医生端的唯一入口：检索或扫描患者，患者提供验证码后才能查看和追加病历。
pub struct AccessWorkflow {
    resolver: PatientResolver,
    gate: ConsentGate,
    store: Arc<dyn RecordStore>,
    audit: AuditTrail,
    active: Option<ActiveAccess>,
}

impl AccessWorkflow {
    /// 创建新的访问工作流
    pub fn new(resolver: PatientResolver, gate: ConsentGate, store: Arc<dyn RecordStore>) -> Self {
        Self {
            resolver,
            gate,
            store,
            audit: AuditTrail::new(),
            active: None,
        }
    }

    /// 以同一个内存存储同时充当患者目录与病历存储
    pub fn with_in_memory_store(store: Arc<InMemoryRecordStore>, gate: ConsentGate) -> Self {
        let resolver = PatientResolver::new(store.clone());
        Self::new(resolver, gate, store)
    }

    /// 模糊搜索患者
    pub async fn search(&self, query: &str) -> Result<Vec<PatientSummary>> {
        self.resolver.search(query).await
    }

    /// 选择患者并签发验证码，替换之前的挑战
    ///
    /// 找不到患者时返回 `PatientNotFound`，之前的选择保持不变。
    pub async fn select_patient(&mut self, identifier: &str) -> Result<&Patient> {
        let patient = self
            .resolver
            .resolve_by_id(identifier)
            .await?
            .ok_or_else(|| SwasthyaError::PatientNotFound(identifier.to_string()))?;

        let challenge = self.gate.issue_challenge(&patient).await?;

        if let Some(previous) = self.active.take() {
            if previous.patient.id != patient.id {
                self.audit.record(
                    &previous.patient.id,
                    AuditAction::AccessClosed,
                    Some(format!("replaced by selection of {}", patient.id)),
                );
            }
        }

        self.audit.record(
            &patient.id,
            AuditAction::ChallengeIssued,
            Some(format!("code sent to {}", challenge.masked_contact())),
        );

        let active = self.active.insert(ActiveAccess { patient, challenge });
        Ok(&active.patient)
    }

    /// 接收扫描成功的标识符并重置扫描会话
    pub async fn select_scanned(&mut self, session: &ScanSession) -> Result<&Patient> {
        let Some(identifier) = session.take_identifier().await else {
            let state = session.state().await;
            return Err(SwasthyaError::InvalidStateTransition {
                from: state.name().to_string(),
                event: "HandOff".to_string(),
            });
        };

        tracing::info!("Scanned identifier {} handed off to access workflow", identifier);
        self.select_patient(&identifier).await
    }

    /// 校验患者提供的验证码
    pub fn verify(&mut self, code: &str) -> Result<ConsentStatus> {
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| SwasthyaError::ConsentRequired("no patient selected".to_string()))?;

        let result = self.gate.verify(&mut active.challenge, code);
        let patient_id = active.patient.id.as_str();
        match &result {
            Ok(_) => {
                self.audit.record(patient_id, AuditAction::VerificationSucceeded, None);
            }
            Err(SwasthyaError::TooManyAttempts { attempts }) => {
                self.audit.record(
                    patient_id,
                    AuditAction::VerificationLocked,
                    Some(format!("{} attempts", attempts)),
                );
            }
            Err(_) => {
                self.audit.record(
                    patient_id,
                    AuditAction::VerificationFailed,
                    Some(format!("attempt {}", active.challenge.attempts())),
                );
            }
        }
        result
    }

    /// 为当前患者重发验证码
    pub async fn resend_code(&mut self) -> Result<()> {
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| SwasthyaError::ConsentRequired("no patient selected".to_string()))?;

        let fresh = self.gate.reissue(&active.challenge, &active.patient).await?;
        active.challenge = fresh;

        self.audit.record(
            &active.patient.id,
            AuditAction::ChallengeReissued,
            Some(format!("code sent to {}", active.challenge.masked_contact())),
        );
        Ok(())
    }

    /// 结束对当前患者的访问，销毁挑战
    pub fn leave_patient(&mut self) {
        if let Some(previous) = self.active.take() {
            self.audit.record(&previous.patient.id, AuditAction::AccessClosed, None);
        }
    }

    /// 读取患者档案
    pub async fn get(&mut self, patient_id: &str) -> Result<PatientRecord> {
        self.require_verified(patient_id)?;

        let record = self
            .store
            .get(patient_id)
            .await?
            .ok_or_else(|| SwasthyaError::PatientNotFound(patient_id.to_string()))?;

        self.audit.record(
            patient_id,
            AuditAction::RecordViewed,
            Some(format!("{} history entries", record.history.len())),
        );
        Ok(record)
    }

    /// 以当前医生身份追加病历条目
    pub async fn append_entry(
        &mut self,
        patient_id: &str,
        diagnosis: &str,
        treatment: Option<&str>,
        clinician: &ClinicianContext,
    ) -> Result<HistoryEntry> {
        self.require_verified(patient_id)?;

        let entry = NewHistoryEntry {
            diagnosis: diagnosis.to_string(),
            treatment: treatment.map(str::to_string),
            clinician: clinician.clone(),
        };
        let created = self.store.append_entry(patient_id, entry).await?;

        self.audit.record(
            patient_id,
            AuditAction::EntryAppended,
            Some(format!("{} by {} at {}", created.id, created.clinician, created.facility)),
        );
        Ok(created)
    }

    /// 当前选中的患者
    pub fn active_patient(&self) -> Option<&Patient> {
        self.active.as_ref().map(|active| &active.patient)
    }

    /// 当前挑战
    pub fn active_challenge(&self) -> Option<&ConsentChallenge> {
        self.active.as_ref().map(|active| &active.challenge)
    }

    pub fn audit_trail(&self) -> &AuditTrail {
        &self.audit
    }

    fn require_verified(&self, patient_id: &str) -> Result<()> {
        match &self.active {
            Some(active) if active.patient.id == patient_id && active.challenge.is_verified() => {
                Ok(())
            }
            Some(active) if active.patient.id == patient_id => Err(SwasthyaError::ConsentRequired(
                format!("consent for {} not yet verified", patient_id),
            )),
            _ => Err(SwasthyaError::ConsentRequired(format!(
                "no consent challenge for {}",
                patient_id
            ))),
        }
    }
}

impl std::fmt::Debug for AccessWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessWorkflow")
            .field("gate", &self.gate)
            .field("audit_events", &self.audit.len())
            .field("active_patient", &self.active_patient().map(|p| p.id.as_str()))
            .finish_non_exhaustive()
    }
}
