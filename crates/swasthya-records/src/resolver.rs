//! 患者检索
//!
//! 按标识符精确查找，或按姓名、标识符、手机号模糊搜索。

use crate::store::PatientDirectory;
use std::sync::Arc;
use swasthya_core::{Patient, PatientSummary, Result};
use tracing::debug;

/// 判断患者摘要是否匹配查询
///
/// 姓名与标识符不区分大小写，手机号按原样比较。`query` 应已去除首尾空白。
pub fn matches_query(summary: &PatientSummary, query: &str) -> bool {
    let lowered = query.to_lowercase();
    summary.name.to_lowercase().contains(&lowered)
        || summary.id.to_lowercase().contains(&lowered)
        || summary.phone.contains(query)
}

/// 患者检索器
#[derive(Clone)]
pub struct PatientResolver {
    directory: Arc<dyn PatientDirectory>,
}

impl PatientResolver {
    pub fn new(directory: Arc<dyn PatientDirectory>) -> Self {
        Self { directory }
    }

    /// 按标识符精确查找，区分大小写
    pub async fn resolve_by_id(&self, identifier: &str) -> Result<Option<Patient>> {
        if identifier.is_empty() {
            return Ok(None);
        }
        self.directory.find_patient(identifier).await
    }

    /// 模糊搜索，结果按标识符排序；空查询返回空结果
    pub async fn search(&self, query: &str) -> Result<Vec<PatientSummary>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<PatientSummary> = self
            .directory
            .list_summaries()
            .await?
            .into_iter()
            .filter(|summary| matches_query(summary, query))
            .collect();
        results.sort_by(|a, b| a.id.cmp(&b.id));

        debug!("Search for {:?} matched {} patients", query, results.len());
        Ok(results)
    }
}

impl std::fmt::Debug for PatientResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatientResolver").finish_non_exhaustive()
    }
}
