//! 访问工作流集成测试

use std::sync::Arc;
use std::time::Duration;
use swasthya_consent::{ConsentGate, ConsentPolicy, ConsentStatus, OutboxDelivery, RandomCodeGenerator};
use swasthya_core::{ClinicianContext, SwasthyaError, DEFAULT_TREATMENT};
use swasthya_records::{sample_records, InMemoryRecordStore};
use swasthya_scan::{
    CameraFacing, CardPayloadDecoder, ScanOutcome, ScanSession, ScanSettings, ScanSource,
    ScanState, SimulatedCamera,
};
use swasthya_workflow::{AccessWorkflow, AuditAction};

fn clinician() -> ClinicianContext {
    ClinicianContext::new("Dr. Rajeev Nair", "Primary Health Center, Kochi")
}

fn workflow() -> (AccessWorkflow, Arc<OutboxDelivery>) {
    let store = Arc::new(InMemoryRecordStore::from_records(sample_records().unwrap()).unwrap());
    let outbox = Arc::new(OutboxDelivery::new());
    let gate = ConsentGate::new(
        Arc::new(RandomCodeGenerator),
        outbox.clone(),
        ConsentPolicy::default(),
    );
    (AccessWorkflow::with_in_memory_store(store, gate), outbox)
}

#[tokio::test]
async fn test_scenario_a_view_and_append() {
    let (mut workflow, outbox) = workflow();

    let patient = workflow.select_patient("SW001234").await.unwrap();
    assert_eq!(patient.name, "Sunil Kumar");

    let code = outbox.latest_code_for("SW001234").unwrap();
    assert_eq!(workflow.verify(&code).unwrap(), ConsentStatus::Verified);

    let before = workflow.get("SW001234").await.unwrap();
    let entry = workflow
        .append_entry("SW001234", "Flu", None, &clinician())
        .await
        .unwrap();
    assert_eq!(entry.treatment, DEFAULT_TREATMENT);
    assert_eq!(entry.facility, "Primary Health Center, Kochi");

    let after = workflow.get("SW001234").await.unwrap();
    assert_eq!(after.history.len(), before.history.len() + 1);
    assert_eq!(after.history[0], entry);

    let actions: Vec<_> = workflow.audit_trail().events().iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::ChallengeIssued,
            AuditAction::VerificationSucceeded,
            AuditAction::RecordViewed,
            AuditAction::EntryAppended,
            AuditAction::RecordViewed,
        ]
    );
}

#[tokio::test]
async fn test_wrong_code_keeps_record_locked() {
    let (mut workflow, outbox) = workflow();
    workflow.select_patient("SW001235").await.unwrap();
    let code = outbox.latest_code_for("SW001235").unwrap();
    let wrong = if code == "000000" { "000001" } else { "000000" };

    assert!(matches!(workflow.verify(wrong), Err(SwasthyaError::InvalidCode)));
    assert!(matches!(
        workflow.get("SW001235").await,
        Err(SwasthyaError::ConsentRequired(_))
    ));

    assert_eq!(workflow.verify(&code).unwrap(), ConsentStatus::Verified);
    assert!(workflow.get("SW001235").await.is_ok());
}

#[tokio::test]
async fn test_verified_consent_does_not_cover_other_patients() {
    let (mut workflow, outbox) = workflow();
    workflow.select_patient("SW001234").await.unwrap();
    workflow
        .verify(&outbox.latest_code_for("SW001234").unwrap())
        .unwrap();

    let result = workflow
        .append_entry("SW001235", "Flu", None, &clinician())
        .await;
    assert!(matches!(result, Err(SwasthyaError::ConsentRequired(_))));
}

#[tokio::test]
async fn test_blank_diagnosis_blocks_append() {
    let (mut workflow, outbox) = workflow();
    workflow.select_patient("SW001237").await.unwrap();
    workflow
        .verify(&outbox.latest_code_for("SW001237").unwrap())
        .unwrap();
    let before = workflow.get("SW001237").await.unwrap().history.len();

    let result = workflow
        .append_entry("SW001237", "   ", Some("Rest"), &clinician())
        .await;
    assert!(matches!(result, Err(SwasthyaError::Validation(_))));
    assert_eq!(workflow.get("SW001237").await.unwrap().history.len(), before);
    assert_eq!(workflow.audit_trail().count(AuditAction::EntryAppended), 0);
}

#[tokio::test]
async fn test_resend_invalidates_previous_code() {
    let (mut workflow, outbox) = workflow();
    workflow.select_patient("SW001236").await.unwrap();
    let first_id = workflow.active_challenge().unwrap().id();

    workflow.resend_code().await.unwrap();
    assert_ne!(workflow.active_challenge().unwrap().id(), first_id);
    assert_eq!(outbox.sent().len(), 2);

    let latest = outbox.latest_code_for("SW001236").unwrap();
    assert_eq!(workflow.verify(&latest).unwrap(), ConsentStatus::Verified);
}

#[tokio::test]
async fn test_leave_patient_destroys_challenge() {
    let (mut workflow, outbox) = workflow();
    workflow.select_patient("SW001234").await.unwrap();
    workflow
        .verify(&outbox.latest_code_for("SW001234").unwrap())
        .unwrap();

    workflow.leave_patient();
    assert!(workflow.active_patient().is_none());
    assert!(matches!(
        workflow.get("SW001234").await,
        Err(SwasthyaError::ConsentRequired(_))
    ));
    assert_eq!(workflow.audit_trail().count(AuditAction::AccessClosed), 1);
}

#[tokio::test]
async fn test_scanned_card_hands_off_to_workflow() {
    let camera = Arc::new(SimulatedCamera::with_frames(vec![
        None,
        Some("swasthya://patient/SW001236"),
        Some("swasthya://patient/SW001236"),
    ]));
    let session = ScanSession::new(
        ScanSource::new(camera.clone(), Arc::new(CardPayloadDecoder::new())),
        ScanSettings {
            frame_interval: Duration::from_millis(1),
            settle_period: Duration::from_millis(1),
            facing: CameraFacing::Back,
        },
    );

    let outcome = session.run(None).await.unwrap();
    assert_eq!(outcome, ScanOutcome::Found("SW001236".to_string()));
    assert!(!camera.is_held());

    let (mut workflow, _outbox) = workflow();
    let patient = workflow.select_scanned(&session).await.unwrap();
    assert_eq!(patient.name, "Priya Singh");
    assert_eq!(session.state().await, ScanState::Idle);
}

#[tokio::test]
async fn test_hand_off_requires_success() {
    let camera = Arc::new(SimulatedCamera::new());
    let session = ScanSession::new(
        ScanSource::new(camera, Arc::new(CardPayloadDecoder::new())),
        ScanSettings::default(),
    );

    let (mut workflow, _outbox) = workflow();
    let result = workflow.select_scanned(&session).await;
    assert!(matches!(
        result,
        Err(SwasthyaError::InvalidStateTransition { .. })
    ));
}
