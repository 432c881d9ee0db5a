//! 病历存储
//!
//! 患者目录与病历存储的抽象，以及基于内存的默认实现。
//! 病史只允许追加，最新条目始终排在最前。

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use swasthya_core::{
    HistoryEntry, NewHistoryEntry, Patient, PatientRecord, PatientSummary, Result, SwasthyaError,
    DEFAULT_TREATMENT,
};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// 患者目录，供检索使用
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    /// 按标识符精确查找
    async fn find_patient(&self, patient_id: &str) -> Result<Option<Patient>>;

    /// 列出所有患者摘要
    async fn list_summaries(&self) -> Result<Vec<PatientSummary>>;
}

/// 病历存储
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 读取患者档案
    async fn get(&self, patient_id: &str) -> Result<Option<PatientRecord>>;

    /// 追加病历条目，返回创建的条目
    async fn append_entry(&self, patient_id: &str, entry: NewHistoryEntry) -> Result<HistoryEntry>;
}

#[derive(Debug)]
struct StoredRecord {
    patient: Patient,
    history: VecDeque<HistoryEntry>,
}

impl StoredRecord {
    fn to_record(&self) -> PatientRecord {
        PatientRecord {
            patient: self.patient.clone(),
            history: self.history.iter().cloned().collect(),
        }
    }
}

/// 内存病历存储
#[derive(Debug)]
pub struct InMemoryRecordStore {
    records: RwLock<BTreeMap<String, StoredRecord>>,
    default_treatment: String,
}

impl InMemoryRecordStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            default_treatment: DEFAULT_TREATMENT.to_string(),
        }
    }

    /// 从已有档案创建存储，载入的病史按就诊日期倒序排列
    pub fn from_records(records: Vec<PatientRecord>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for record in records {
            let id = record.patient.id.clone();
            if id.is_empty() {
                return Err(SwasthyaError::Validation("patient identifier must not be empty".to_string()));
            }

            let mut history = record.history;
            history.sort_by(|a, b| b.visit_date.cmp(&a.visit_date));

            let stored = StoredRecord {
                patient: record.patient,
                history: history.into(),
            };
            if map.insert(id.clone(), stored).is_some() {
                return Err(SwasthyaError::Validation(format!("duplicate patient identifier {}", id)));
            }
        }

        info!("Record store loaded with {} patients", map.len());
        Ok(Self {
            records: RwLock::new(map),
            default_treatment: DEFAULT_TREATMENT.to_string(),
        })
    }

    /// 从JSON字符串载入
    pub fn from_json_str(json: &str) -> Result<Self> {
        let records: Vec<PatientRecord> = serde_json::from_str(json)?;
        Self::from_records(records)
    }

    /// 从JSON文件载入
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await?;
        debug!("Loading patient directory from {}", path.display());
        Self::from_json_str(&json)
    }

    /// 设置未填写治疗方案时的默认文本
    pub fn with_default_treatment(mut self, treatment: impl Into<String>) -> Self {
        self.default_treatment = treatment.into();
        self
    }

    pub fn default_treatment(&self) -> &str {
        &self.default_treatment
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// 校验并构造新条目，不触及存储
    fn build_entry(&self, entry: NewHistoryEntry) -> Result<HistoryEntry> {
        let diagnosis = entry.diagnosis.trim();
        if diagnosis.is_empty() {
            return Err(SwasthyaError::Validation("diagnosis must not be empty".to_string()));
        }

        let clinician = entry.clinician.clinician.trim();
        let facility = entry.clinician.facility.trim();
        if clinician.is_empty() || facility.is_empty() {
            return Err(SwasthyaError::Validation(
                "clinician and facility must be provided".to_string(),
            ));
        }

        let treatment = entry
            .treatment
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(self.default_treatment.as_str());

        let recorded_at = Utc::now();
        Ok(HistoryEntry {
            id: Uuid::new_v4(),
            visit_date: recorded_at.date_naive(),
            diagnosis: diagnosis.to_string(),
            treatment: treatment.to_string(),
            clinician: clinician.to_string(),
            facility: facility.to_string(),
            recorded_at,
        })
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PatientDirectory for InMemoryRecordStore {
    async fn find_patient(&self, patient_id: &str) -> Result<Option<Patient>> {
        let records = self.records.read().await;
        Ok(records.get(patient_id).map(|stored| stored.patient.clone()))
    }

    async fn list_summaries(&self) -> Result<Vec<PatientSummary>> {
        let records = self.records.read().await;
        Ok(records.values().map(|stored| stored.to_record().summary()).collect())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, patient_id: &str) -> Result<Option<PatientRecord>> {
        let records = self.records.read().await;
        Ok(records.get(patient_id).map(StoredRecord::to_record))
    }

    async fn append_entry(&self, patient_id: &str, entry: NewHistoryEntry) -> Result<HistoryEntry> {
        let created = self.build_entry(entry)?;

        let mut records = self.records.write().await;
        let stored = records
            .get_mut(patient_id)
            .ok_or_else(|| SwasthyaError::PatientNotFound(patient_id.to_string()))?;
        stored.history.push_front(created.clone());

        info!(
            "Appended history entry {} for patient {} ({} entries)",
            created.id,
            patient_id,
            stored.history.len()
        );
        Ok(created)
    }
}
