//! Swasthya医生端命令行

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use swasthya_admin::{init_tracing, ConfigManager, SwasthyaConfig};
use swasthya_consent::{ConsentGate, ConsoleDelivery, RandomCodeGenerator};
use swasthya_core::{PatientRecord, SwasthyaError};
use swasthya_records::{sample_records, InMemoryRecordStore};
use swasthya_scan::{CardPayloadDecoder, ScanSession, ScanSource, ScanState, SimulatedCamera};
use swasthya_workflow::AccessWorkflow;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{error, info};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "swasthya")]
#[command(about = "Swasthya 医生端：识别患者并在知情同意后访问病历")]
struct Args {
    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 患者目录JSON文件，覆盖配置文件
    #[arg(short, long, global = true)]
    directory: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 按姓名、标识符或手机号搜索患者
    Search { query: String },

    /// 验证后查看患者档案
    Show { identifier: String },

    /// 验证后追加一条病历
    Append {
        identifier: String,

        /// 诊断
        #[arg(long)]
        diagnosis: String,

        /// 治疗方案
        #[arg(long)]
        treatment: Option<String>,
    },

    /// 读取健康卡图片并进入验证流程
    Scan {
        /// 健康卡图片或载荷文件
        #[arg(long)]
        payload: PathBuf,
    },
}

type StdinLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let manager = ConfigManager::new(args.config.as_deref()).context("加载配置失败")?;
    let mut config = manager.get_config().await;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(directory) = &args.directory {
        config.records.directory_path = Some(directory.clone());
    }

    init_tracing(&config.logging)?;
    info!("Swasthya CLI starting as {} at {}", config.clinician.name, config.clinician.facility);

    let mut workflow = build_workflow(&config).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if let Err(e) = run(args.command, &config, &mut workflow, &mut lines).await {
        error!("Command failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn build_workflow(config: &SwasthyaConfig) -> Result<AccessWorkflow> {
    let store = match &config.records.directory_path {
        Some(path) => InMemoryRecordStore::from_json_file(path)
            .await
            .with_context(|| format!("读取患者目录失败: {}", path.display()))?,
        None => InMemoryRecordStore::from_records(sample_records()?)?,
    }
    .with_default_treatment(config.records.treatment_placeholder.clone());

    let gate = ConsentGate::new(
        Arc::new(RandomCodeGenerator),
        Arc::new(ConsoleDelivery),
        config.consent.to_policy(),
    );
    Ok(AccessWorkflow::with_in_memory_store(Arc::new(store), gate))
}

async fn run(
    command: Command,
    config: &SwasthyaConfig,
    workflow: &mut AccessWorkflow,
    lines: &mut StdinLines,
) -> Result<()> {
    match command {
        Command::Search { query } => {
            let results = workflow.search(&query).await?;
            if results.is_empty() {
                println!("未找到匹配 \"{}\" 的患者", query.trim());
            }
            for summary in results {
                let last_visit = summary
                    .last_visit
                    .map(|date| date.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<10} {:<16} {:>3}岁 {:<4} {:<18} 最近就诊 {}",
                    summary.id, summary.name, summary.age, summary.blood_group, summary.phone, last_visit
                );
            }
        }
        Command::Show { identifier } => {
            obtain_consent(workflow, &identifier, lines).await?;
            let record = workflow.get(&identifier).await?;
            print_record(&record);
            workflow.leave_patient();
        }
        Command::Append {
            identifier,
            diagnosis,
            treatment,
        } => {
            obtain_consent(workflow, &identifier, lines).await?;
            let clinician = config.clinician.to_context();
            let entry = workflow
                .append_entry(&identifier, &diagnosis, treatment.as_deref(), &clinician)
                .await?;
            println!(
                "已追加 {} {}：{}（{}）",
                entry.visit_date, identifier, entry.diagnosis, entry.treatment
            );
            workflow.leave_patient();
        }
        Command::Scan { payload } => {
            let bytes = tokio::fs::read(&payload)
                .await
                .with_context(|| format!("读取文件失败: {}", payload.display()))?;

            // 命令行没有摄像头，只走图片上传路径
            let camera = Arc::new(SimulatedCamera::new());
            camera.set_unavailable(true);
            let session = ScanSession::new(
                ScanSource::new(camera, Arc::new(CardPayloadDecoder::new())),
                config.scanner.to_settings(),
            );

            match session.upload_image(&bytes).await? {
                ScanState::Success { .. } => {}
                ScanState::Error { reason } => bail!("无法识别健康卡: {}", reason),
                other => bail!("扫描未完成，当前状态 {}", other.name()),
            }

            let identifier = workflow.select_scanned(&session).await?.id.clone();
            verify_interactively(workflow, lines).await?;
            let record = workflow.get(&identifier).await?;
            print_record(&record);
            workflow.leave_patient();
        }
    }
    Ok(())
}

/// 选择患者并从标准输入读取验证码
async fn obtain_consent(
    workflow: &mut AccessWorkflow,
    identifier: &str,
    lines: &mut StdinLines,
) -> Result<()> {
    let patient = workflow.select_patient(identifier).await?;
    println!("患者：{}（{}）", patient.name, patient.id);
    verify_interactively(workflow, lines).await
}

async fn verify_interactively(workflow: &mut AccessWorkflow, lines: &mut StdinLines) -> Result<()> {
    loop {
        if let Some(challenge) = workflow.active_challenge() {
            println!("验证码已发送至 {}，请输入6位验证码（输入 r 重发）：", challenge.masked_contact());
        }

        let Some(line) = lines.next_line().await? else {
            bail!("未收到验证码");
        };
        let input = line.as_str();
        if input == "r" {
            workflow.resend_code().await?;
            continue;
        }

        match workflow.verify(input) {
            Ok(_) => {
                println!("验证成功");
                return Ok(());
            }
            Err(SwasthyaError::InvalidCode) => println!("验证码错误，请重试"),
            Err(e) => return Err(e.into()),
        }
    }
}

fn print_record(record: &PatientRecord) {
    let patient = &record.patient;
    println!("{}（{}）", patient.name, patient.id);
    println!("  年龄: {}  血型: {}", patient.age, patient.blood_group);
    println!("  电话: {}  紧急联系人: {}", patient.phone, patient.emergency_contact);
    if !patient.allergies.is_empty() {
        let allergies: Vec<&str> = patient.allergies.iter().map(String::as_str).collect();
        println!("  过敏: {}", allergies.join(", "));
    }

    println!("  病史（{} 条）:", record.history.len());
    for entry in &record.history {
        println!(
            "    {}  {} / {}  [{} @ {}]",
            entry.visit_date, entry.diagnosis, entry.treatment, entry.clinician, entry.facility
        );
    }
}
