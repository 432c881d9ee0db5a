//! 内置示例患者目录

use swasthya_core::{PatientRecord, Result};

const SAMPLE_DIRECTORY: &str = include_str!("../data/sample_directory.json");

/// 演示与测试使用的示例档案
pub fn sample_records() -> Result<Vec<PatientRecord>> {
    Ok(serde_json::from_str(SAMPLE_DIRECTORY)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_directory_parses() {
        let records = sample_records().unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].patient.name, "Sunil Kumar");
        assert!(records[0].patient.allergies.contains("Penicillin"));
    }
}
