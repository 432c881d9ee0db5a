//! 访问工作流演示程序
//!
//! 模拟摄像头扫描健康卡，患者收到验证码后医生查看并追加病历

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swasthya::consent::{CodeDelivery, ConsentGate, ConsentPolicy, RandomCodeGenerator};
use swasthya::core::utils::mask_phone;
use swasthya::core::{ClinicianContext, Patient};
use swasthya::records::{sample_records, InMemoryRecordStore};
use swasthya::scan::{
    CameraFacing, CardPayloadDecoder, ScanOutcome, ScanSession, ScanSettings, ScanSource,
    SimulatedCamera,
};
use swasthya::AccessWorkflow;

/// 演示用短信网关：把验证码放进“患者手机”
#[derive(Debug, Default)]
struct PatientPhone {
    inbox: Mutex<Option<String>>,
}

impl PatientPhone {
    fn read_code(&self) -> Option<String> {
        self.inbox.lock().ok()?.clone()
    }
}

#[async_trait]
impl CodeDelivery for PatientPhone {
    async fn deliver(&self, patient: &Patient, code: &str) -> swasthya::Result<()> {
        println!("📱 短信已发送至 {}", mask_phone(&patient.phone));
        if let Ok(mut inbox) = self.inbox.lock() {
            *inbox = Some(code.to_string());
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("🚀 Swasthya 访问工作流演示\n");

    // 1. 模拟摄像头：前两帧没有二维码，随后稳定读到健康卡
    let camera = Arc::new(SimulatedCamera::with_frames(vec![
        None,
        None,
        Some("swasthya://patient/SW001234"),
        Some("swasthya://patient/SW001234"),
    ]));
    let session = ScanSession::new(
        ScanSource::new(camera.clone(), Arc::new(CardPayloadDecoder::new())),
        ScanSettings {
            frame_interval: Duration::from_millis(50),
            settle_period: Duration::from_millis(200),
            facing: CameraFacing::Back,
        },
    );

    let outcome = session.run(None).await?;
    println!("📷 扫描结果: {:?}（摄像头已释放: {}）", outcome, !camera.is_held());
    if !matches!(outcome, ScanOutcome::Found(_)) {
        anyhow::bail!("未能识别健康卡");
    }

    // 2. 建立访问工作流
    let store = Arc::new(InMemoryRecordStore::from_records(sample_records()?)?);
    let phone = Arc::new(PatientPhone::default());
    let gate = ConsentGate::new(
        Arc::new(RandomCodeGenerator),
        phone.clone(),
        ConsentPolicy {
            max_attempts: Some(3),
        },
    );
    let mut workflow = AccessWorkflow::with_in_memory_store(store, gate);

    // 3. 扫描结果交给工作流并签发验证码
    let patient = workflow.select_scanned(&session).await?;
    println!("👤 患者: {}（{}）", patient.name, patient.id);
    let patient_id = patient.id.clone();

    // 4. 先输错一次，再输入患者手机上的验证码
    if let Err(e) = workflow.verify("000000x") {
        println!("❌ 验证失败: {}", e);
    }
    let code = phone
        .read_code()
        .ok_or_else(|| anyhow::anyhow!("患者未收到验证码"))?;
    workflow.verify(&code)?;
    println!("✅ 患者已授权访问");

    // 5. 查看并追加病历
    let record = workflow.get(&patient_id).await?;
    println!("\n📋 病史（{} 条）:", record.history.len());
    for entry in &record.history {
        println!("   {} {} - {}", entry.visit_date, entry.diagnosis, entry.facility);
    }

    let clinician = ClinicianContext::new("Dr. Rajeev Nair", "Primary Health Center, Kochi");
    let entry = workflow
        .append_entry(&patient_id, "Viral fever", Some("Paracetamol 500mg, rest"), &clinician)
        .await?;
    println!("\n📝 已追加: {} {}（{}）", entry.visit_date, entry.diagnosis, entry.treatment);

    workflow.leave_patient();

    // 6. 审计记录
    println!("\n🔍 审计记录:");
    for event in workflow.audit_trail().events() {
        println!(
            "   {} {} {}",
            event.occurred_at.format("%H:%M:%S"),
            event.action.name(),
            event.detail.as_deref().unwrap_or("")
        );
    }

    println!("\n🎉 演示完成");
    Ok(())
}
