//! 病史追加测试

use proptest::prelude::*;
use swasthya_core::{ClinicianContext, NewHistoryEntry, SwasthyaError};
use swasthya_records::{sample_records, InMemoryRecordStore, RecordStore};

fn store() -> InMemoryRecordStore {
    InMemoryRecordStore::from_records(sample_records().unwrap()).unwrap()
}

fn entry(diagnosis: &str) -> NewHistoryEntry {
    NewHistoryEntry {
        diagnosis: diagnosis.to_string(),
        treatment: None,
        clinician: ClinicianContext::new("Dr. Rajeev Nair", "Primary Health Center, Kochi"),
    }
}

#[tokio::test]
async fn test_whitespace_diagnosis_is_rejected() {
    let store = store();
    let before = store.get("SW001234").await.unwrap().unwrap().history.len();

    let result = store.append_entry("SW001234", entry("   ")).await;
    assert!(matches!(result, Err(SwasthyaError::Validation(_))));

    let after = store.get("SW001234").await.unwrap().unwrap().history.len();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_newest_entry_comes_first() {
    let store = store();
    store.append_entry("SW001234", entry("Flu")).await.unwrap();
    let latest = store.append_entry("SW001234", entry("  Migraine ")).await.unwrap();

    let record = store.get("SW001234").await.unwrap().unwrap();
    assert_eq!(record.history[0], latest);
    assert_eq!(record.history[0].diagnosis, "Migraine");
    assert_eq!(record.history[1].diagnosis, "Flu");
}

proptest! {
    /// 连续追加N条后病史恰好增加N条，且按追加顺序倒序排列
    #[test]
    fn prop_append_is_monotonic(diagnoses in proptest::collection::vec("[A-Za-z][A-Za-z ]{0,20}", 1..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let store = store();
            let before = store.get("SW001236").await.unwrap().unwrap().history;

            let mut appended = Vec::new();
            for diagnosis in &diagnoses {
                let created = store.append_entry("SW001236", entry(diagnosis)).await.unwrap();
                let record = store.get("SW001236").await.unwrap().unwrap();
                prop_assert_eq!(&record.history[0], &created);
                appended.push(created);
            }

            let after = store.get("SW001236").await.unwrap().unwrap().history;
            prop_assert_eq!(after.len(), before.len() + diagnoses.len());

            appended.reverse();
            prop_assert_eq!(&after[..appended.len()], &appended[..]);
            prop_assert_eq!(&after[appended.len()..], &before[..]);
            Ok(())
        })?;
    }
}
