#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use swasthya_scan::{
    CameraFacing, CardPayloadDecoder, ScanSession, ScanSettings, ScanSource, ScanState,
    SimulatedCamera,
};

pub fn fast_settings() -> ScanSettings {
    ScanSettings {
        frame_interval: Duration::from_millis(1),
        settle_period: Duration::from_millis(1),
        facing: CameraFacing::Back,
    }
}

pub fn session_with(camera: Arc<SimulatedCamera>) -> ScanSession {
    ScanSession::new(
        ScanSource::new(camera, Arc::new(CardPayloadDecoder::new())),
        fast_settings(),
    )
}

/// 等待会话进入满足条件的状态
pub async fn wait_for_state(session: &ScanSession, expected: impl Fn(&ScanState) -> bool) {
    for _ in 0..1000 {
        if expected(&session.state().await) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("session never reached expected state, now {:?}", session.state().await);
}
