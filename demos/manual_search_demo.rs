//! 手动检索演示程序
//!
//! 没有健康卡时按姓名、标识符或手机号检索患者，并演示验证码锁定与重发

use std::sync::Arc;
use swasthya::consent::{ConsentGate, ConsentPolicy, OutboxDelivery, RandomCodeGenerator};
use swasthya::core::ClinicianContext;
use swasthya::records::{sample_records, InMemoryRecordStore};
use swasthya::{AccessWorkflow, SwasthyaError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("🚀 Swasthya 手动检索演示\n");

    let store = Arc::new(InMemoryRecordStore::from_records(sample_records()?)?);
    let outbox = Arc::new(OutboxDelivery::new());
    let gate = ConsentGate::new(
        Arc::new(RandomCodeGenerator),
        outbox.clone(),
        ConsentPolicy {
            max_attempts: Some(2),
        },
    );
    let mut workflow = AccessWorkflow::with_in_memory_store(store, gate);

    // 1. 几种检索方式
    for query in ["raj", "SW00123", "76543", "   ", "nobody"] {
        let results = workflow.search(query).await?;
        println!("🔎 \"{}\" -> {} 条结果", query, results.len());
        for summary in results {
            println!(
                "   {} {}（{}岁, {}）最近就诊: {}",
                summary.id,
                summary.name,
                summary.age,
                summary.blood_group,
                summary
                    .last_visit
                    .map(|date| date.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
        }
    }

    // 2. 不存在的患者
    match workflow.select_patient("SW999999").await {
        Err(SwasthyaError::PatientNotFound(id)) => println!("\n❓ 未找到患者 {}", id),
        other => println!("\n意外结果: {:?}", other.map(|p| p.id.clone())),
    }

    // 3. 选择患者，连续输错直到锁定
    let patient_id = workflow.select_patient("SW001235").await?.id.clone();
    for attempt in ["111111", "222222", "333333"] {
        match workflow.verify(attempt) {
            Ok(_) => println!("✅ 验证通过"),
            Err(e) => println!("❌ {} -> {}", attempt, e),
        }
    }

    // 4. 重发验证码后重新验证
    workflow.resend_code().await?;
    let code = outbox
        .latest_code_for(&patient_id)
        .ok_or_else(|| anyhow::anyhow!("发件箱中没有验证码"))?;
    workflow.verify(&code)?;
    println!("✅ 重发后验证通过（共发送 {} 条短信）", outbox.sent().len());

    // 5. 追加一条未填写治疗方案的病历
    let clinician = ClinicianContext::new("Dr. Anjali Menon", "CHC Ernakulam");
    let entry = workflow
        .append_entry(&patient_id, "Flu", None, &clinician)
        .await?;
    println!("📝 治疗方案: {}", entry.treatment);

    workflow.leave_patient();
    println!("\n🎉 演示完成，审计事件 {} 条", workflow.audit_trail().len());
    Ok(())
}
