//! 配置文件与环境变量叠加测试

use std::path::PathBuf;
use swasthya_admin::{ConfigManager, LogFormat};
use swasthya_scan::CameraFacing;

fn temp_config(contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("swasthya-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(&path, contents).unwrap();
    path
}

#[tokio::test]
async fn test_file_overrides_defaults() {
    let path = temp_config(
        r#"
        [scanner]
        facing = "front"

        [consent]
        max_attempts = 5

        [clinician]
        name = "Dr. Anjali Menon"
        facility = "CHC Ernakulam"
        "#,
    );

    let manager = ConfigManager::new(Some(&path)).unwrap();
    let config = manager.get_config().await;
    assert_eq!(config.scanner.facing, CameraFacing::Front);
    assert_eq!(config.scanner.frame_interval_ms, 100);
    assert_eq!(config.consent.max_attempts, Some(5));
    assert_eq!(config.clinician.to_context().facility, "CHC Ernakulam");
    assert_eq!(config.logging.format, LogFormat::Full);

    std::fs::remove_file(path).unwrap();
}

#[tokio::test]
async fn test_missing_file_is_an_error() {
    let path = std::env::temp_dir().join("swasthya-does-not-exist.toml");
    assert!(ConfigManager::new(Some(&path)).is_err());
}

#[tokio::test]
async fn test_invalid_file_is_rejected() {
    let path = temp_config(
        r#"
        [scanner]
        frame_interval_ms = 0
        "#,
    );
    assert!(ConfigManager::new(Some(&path)).is_err());
    std::fs::remove_file(path).unwrap();
}

#[tokio::test]
async fn test_update_writes_back_to_file() {
    let path = temp_config("[records]\ntreatment_placeholder = \"Observation only\"\n");
    let manager = ConfigManager::new(Some(&path)).unwrap();

    let mut config = manager.get_config().await;
    assert_eq!(config.records.treatment_placeholder, "Observation only");
    config.scanner.settle_period_ms = 750;
    manager.update_config(config.clone()).await.unwrap();

    manager.reload_config().await.unwrap();
    assert_eq!(manager.get_config().await, config);

    let mut invalid = config.clone();
    invalid.clinician.name = String::new();
    assert!(manager.update_config(invalid).await.is_err());
    assert_eq!(manager.get_config().await, config);

    std::fs::remove_file(path).unwrap();
}
