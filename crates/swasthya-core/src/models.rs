//! 核心数据模型定义

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// 未填写治疗方案时写入的默认文本
pub const DEFAULT_TREATMENT: &str = "No specific treatment prescribed";

/// 患者基本信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Patient {
    pub id: String,                  // 健康卡标识符，区分大小写
    pub name: String,                // 患者姓名
    pub age: u32,                    // 年龄
    pub blood_group: String,         // 血型
    pub phone: String,               // 登记手机号
    pub emergency_contact: String,   // 紧急联系人电话
    #[serde(default)]
    pub allergies: BTreeSet<String>, // 过敏原
}

/// 病历条目，一经创建不可修改
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub visit_date: NaiveDate,
    pub diagnosis: String,
    pub treatment: String,
    pub clinician: String, // 记录医生
    pub facility: String,  // 记录机构
    pub recorded_at: DateTime<Utc>,
}

/// 患者完整档案：基本信息 + 按时间倒序排列的病史
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatientRecord {
    pub patient: Patient,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl PatientRecord {
    /// 最近一次就诊
    pub fn latest_entry(&self) -> Option<&HistoryEntry> {
        self.history.first()
    }

    /// 生成搜索结果摘要
    pub fn summary(&self) -> PatientSummary {
        let latest = self.latest_entry();
        PatientSummary {
            id: self.patient.id.clone(),
            name: self.patient.name.clone(),
            age: self.patient.age,
            phone: self.patient.phone.clone(),
            blood_group: self.patient.blood_group.clone(),
            last_visit: latest.map(|entry| entry.visit_date),
            last_facility: latest.map(|entry| entry.facility.clone()),
        }
    }
}

/// 患者搜索结果摘要
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatientSummary {
    pub id: String,
    pub name: String,
    pub age: u32,
    pub phone: String,
    pub blood_group: String,
    pub last_visit: Option<NaiveDate>,
    pub last_facility: Option<String>,
}

/// 当前操作医生及其所在机构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClinicianContext {
    pub clinician: String,
    pub facility: String,
}

impl ClinicianContext {
    pub fn new(clinician: impl Into<String>, facility: impl Into<String>) -> Self {
        Self {
            clinician: clinician.into(),
            facility: facility.into(),
        }
    }
}

/// 待追加的病历条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHistoryEntry {
    pub diagnosis: String,
    pub treatment: Option<String>,
    pub clinician: ClinicianContext,
}
