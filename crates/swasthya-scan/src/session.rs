//! 扫描会话
//!
//! 异步驱动扫描状态机。会话锁不跨越设备调用持有；每次开始、上传、
//! 取消或重置都会推进代数，携带旧代数返回的结果视为过期并丢弃。
//! 取消会中断尚未完成的设备申请，新的申请要等上一次申请退出后才开始。

use crate::source::{CameraFacing, DeviceLease, ScanSource};
use crate::state_machine::{ScanEffect, ScanEvent, ScanState, ScanStateMachine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use swasthya_core::{Result, ScanFailure, SwasthyaError};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

/// 扫描参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    pub frame_interval: Duration, // 两次读帧之间的间隔
    pub settle_period: Duration,  // 识别后等待确认的时间
    pub facing: CameraFacing,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(100),
            settle_period: Duration::from_millis(500),
            facing: CameraFacing::Back,
        }
    }
}

/// 扫描结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Found(String),
    Failed(ScanFailure),
    Cancelled,
}

#[derive(Debug)]
struct SessionInner {
    state: ScanState,
    lease: Option<Arc<DeviceLease>>,
    generation: u64,
    last_identifier: Option<String>,
    last_error: Option<ScanFailure>,
}

impl SessionInner {
    fn release_lease(&mut self) {
        if let Some(lease) = self.lease.take() {
            lease.release();
        }
    }
}

/// 扫描会话
#[derive(Debug)]
pub struct ScanSession {
    source: ScanSource,
    machine: ScanStateMachine,
    settings: ScanSettings,
    inner: Mutex<SessionInner>,
    acquire_slot: Mutex<()>, // 同一时刻只有一个设备申请在进行
    abort_signal: Notify,
}

impl ScanSession {
    /// 创建新的扫描会话
    pub fn new(source: ScanSource, settings: ScanSettings) -> Self {
        Self {
            source,
            machine: ScanStateMachine::new(),
            settings,
            inner: Mutex::new(SessionInner {
                state: ScanState::Idle,
                lease: None,
                generation: 0,
                last_identifier: None,
                last_error: None,
            }),
            acquire_slot: Mutex::new(()),
            abort_signal: Notify::new(),
        }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// 当前状态
    pub async fn state(&self) -> ScanState {
        self.inner.lock().await.state.clone()
    }

    /// 是否持有采集设备
    pub async fn is_device_held(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.lease.as_ref().is_some_and(|lease| !lease.is_released())
    }

    pub async fn last_identifier(&self) -> Option<String> {
        self.inner.lock().await.last_identifier.clone()
    }

    pub async fn last_error(&self) -> Option<ScanFailure> {
        self.inner.lock().await.last_error.clone()
    }

    /// 应用事件并执行会话内的副作用，返回需要驱动方继续执行的副作用
    fn apply(&self, inner: &mut SessionInner, event: ScanEvent) -> Result<Vec<ScanEffect>> {
        let transition = self.machine.transition(&inner.state, &event)?;
        debug!(
            "Scan transition {} --{}--> {}",
            inner.state.name(),
            event.name(),
            transition.state.name()
        );

        inner.state = transition.state;
        if let ScanState::Error { reason } = &inner.state {
            inner.last_error = Some(reason.clone());
        }

        let mut pending = Vec::new();
        for effect in transition.effects {
            match effect {
                ScanEffect::ReleaseDevice => inner.release_lease(),
                ScanEffect::Deliver(identifier) => inner.last_identifier = Some(identifier),
                other => pending.push(other),
            }
        }

        Ok(pending)
    }

    /// 开始摄像头扫描。非空闲状态下调用会被拒绝，不会申请第二个设备
    pub async fn start(&self, facing: Option<CameraFacing>) -> Result<ScanState> {
        let (generation, aborted) = {
            let mut inner = self.inner.lock().await;
            self.apply(&mut inner, ScanEvent::Start)?;
            inner.generation += 1;
            inner.last_identifier = None;
            inner.last_error = None;
            // 在会话锁内登记，之后的取消一定能唤醒它
            (inner.generation, self.abort_signal.notified())
        };

        let facing = facing.unwrap_or(self.settings.facing);
        info!("Starting camera scan ({:?})", facing);

        let _slot = self.acquire_slot.lock().await;
        let acquired = tokio::select! {
            biased;
            _ = aborted => None,
            result = self.source.acquire_device(facing) => Some(result),
        };

        let Some(acquired) = acquired else {
            warn!("Pending device acquisition aborted by cancellation");
            return Ok(self.inner.lock().await.state.clone());
        };

        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.state != ScanState::Initializing {
            if let Ok(lease) = acquired {
                lease.release();
            }
            warn!("Discarding device acquisition that completed after cancellation");
            return Ok(inner.state.clone());
        }

        match acquired {
            Ok(lease) => {
                inner.lease = Some(Arc::new(lease));
                self.apply(&mut inner, ScanEvent::DeviceAcquired)?;
            }
            Err(e) => {
                let reason = e.scan_failure().unwrap_or(ScanFailure::DeviceUnavailable);
                warn!("Camera acquisition failed: {}", e);
                self.apply(&mut inner, ScanEvent::AcquireFailed(reason))?;
            }
        }

        Ok(inner.state.clone())
    }

    /// 读取并解码一帧
    pub async fn poll_frame(&self) -> Result<ScanState> {
        let (generation, lease) = self.current_lease("FrameDecoded", |state| {
            matches!(state, ScanState::Scanning)
        })
        .await?;

        let decoded = self.source.decode_frame(&lease).await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.state != ScanState::Scanning {
            debug!("Discarding stale frame result");
            return Ok(inner.state.clone());
        }

        self.apply(&mut inner, ScanEvent::FrameDecoded(decoded))?;
        Ok(inner.state.clone())
    }

    /// 稳定期结束后读取确认帧
    pub async fn confirm(&self) -> Result<ScanState> {
        let (generation, lease) = self.current_lease("SettleElapsed", |state| {
            matches!(state, ScanState::Detected { .. })
        })
        .await?;

        tokio::time::sleep(self.settings.settle_period).await;
        let confirmation = self.source.decode_frame(&lease).await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation || !matches!(inner.state, ScanState::Detected { .. }) {
            debug!("Discarding stale confirmation frame");
            return Ok(inner.state.clone());
        }

        if let ScanState::Detected { candidate } = &inner.state {
            if confirmation.as_deref() != Some(candidate.as_str()) {
                debug!("Detection of {} not confirmed, resuming scan", candidate);
            }
        }
        self.apply(&mut inner, ScanEvent::SettleElapsed { confirmation })?;
        Ok(inner.state.clone())
    }

    /// 提交已确认的标识符，释放设备
    pub async fn commit(&self) -> Result<ScanState> {
        let mut inner = self.inner.lock().await;
        self.apply(&mut inner, ScanEvent::Committed)?;
        if let Some(identifier) = inner.state.identifier() {
            info!("Scan completed with identifier {}", identifier);
        }
        Ok(inner.state.clone())
    }

    /// 上传图片识别，仅在空闲状态下可用
    pub async fn upload_image(&self, bytes: &[u8]) -> Result<ScanState> {
        let generation = {
            let mut inner = self.inner.lock().await;
            if inner.state != ScanState::Idle {
                return Err(SwasthyaError::InvalidStateTransition {
                    from: inner.state.name().to_string(),
                    event: "ImageUploaded".to_string(),
                });
            }
            inner.generation += 1;
            inner.last_identifier = None;
            inner.last_error = None;
            inner.generation
        };

        info!("Decoding uploaded image ({} bytes)", bytes.len());
        let decoded = self.source.decode_image(bytes).await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.state != ScanState::Idle {
            debug!("Discarding stale image decode result");
            return Ok(inner.state.clone());
        }

        let event = match decoded {
            Ok(identifier) => ScanEvent::ImageDecoded(identifier),
            Err(e) => {
                warn!("Uploaded image rejected: {}", e);
                ScanEvent::ImageRejected
            }
        };
        self.apply(&mut inner, event)?;
        Ok(inner.state.clone())
    }

    /// 取消扫描：立即回到空闲并释放设备，进行中的结果将被丢弃
    pub async fn cancel(&self) -> ScanState {
        self.abort(ScanEvent::Cancel).await
    }

    /// 从终止状态重置回空闲
    pub async fn reset(&self) -> ScanState {
        self.abort(ScanEvent::Reset).await
    }

    async fn abort(&self, event: ScanEvent) -> ScanState {
        let mut inner = self.inner.lock().await;
        inner.generation += 1;
        let from = inner.state.name();

        if let Err(e) = self.apply(&mut inner, event.clone()) {
            warn!("{} from {} failed: {}", event.name(), from, e);
            inner.state = ScanState::Idle;
        }
        inner.release_lease();
        inner.last_identifier = None;
        inner.last_error = None;
        self.abort_signal.notify_waiters();

        info!("Scan session {} from {}", event.name().to_lowercase(), from);
        inner.state.clone()
    }

    /// 交付成功扫描的标识符并销毁会话状态
    pub async fn take_identifier(&self) -> Option<String> {
        let mut inner = self.inner.lock().await;
        let identifier = inner.state.identifier()?.to_string();

        inner.generation += 1;
        inner.state = ScanState::Idle;
        inner.last_identifier = None;
        inner.last_error = None;
        Some(identifier)
    }

    /// 驱动扫描直到成功、失败或被取消
    ///
    /// 核心不设超时，调用方可用 `tokio::time::timeout` 包裹并在超时后调用 `cancel`。
    pub async fn run(&self, facing: Option<CameraFacing>) -> Result<ScanOutcome> {
        let mut state = self.start(facing).await?;

        loop {
            state = match state {
                ScanState::Scanning => {
                    let next = self.refresh_on_race(self.poll_frame().await).await?;
                    if next == ScanState::Scanning {
                        tokio::time::sleep(self.settings.frame_interval).await;
                    }
                    next
                }
                ScanState::Detected { .. } => self.refresh_on_race(self.confirm().await).await?,
                ScanState::Processing { .. } => self.refresh_on_race(self.commit().await).await?,
                ScanState::Success { identifier } => return Ok(ScanOutcome::Found(identifier)),
                ScanState::Error { reason } => return Ok(ScanOutcome::Failed(reason)),
                ScanState::Idle => return Ok(ScanOutcome::Cancelled),
                ScanState::Initializing => {
                    tokio::time::sleep(self.settings.frame_interval).await;
                    self.state().await
                }
            };
        }
    }

    /// 状态在两步之间被取消时，以最新状态继续
    async fn refresh_on_race(&self, result: Result<ScanState>) -> Result<ScanState> {
        match result {
            Ok(state) => Ok(state),
            Err(SwasthyaError::InvalidStateTransition { .. }) => Ok(self.state().await),
            Err(e) => Err(e),
        }
    }

    async fn current_lease(
        &self,
        event: &str,
        allowed: impl Fn(&ScanState) -> bool,
    ) -> Result<(u64, Arc<DeviceLease>)> {
        let inner = self.inner.lock().await;
        if !allowed(&inner.state) {
            return Err(SwasthyaError::InvalidStateTransition {
                from: inner.state.name().to_string(),
                event: event.to_string(),
            });
        }

        let lease = inner.lease.clone().ok_or_else(|| {
            SwasthyaError::Internal(format!("no device lease in state {}", inner.state.name()))
        })?;
        Ok((inner.generation, lease))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CardPayloadDecoder, SimulatedCamera};

    fn session_with(camera: Arc<SimulatedCamera>) -> ScanSession {
        let settings = ScanSettings {
            frame_interval: Duration::from_millis(1),
            settle_period: Duration::from_millis(1),
            facing: CameraFacing::Back,
        };
        ScanSession::new(
            ScanSource::new(camera, Arc::new(CardPayloadDecoder::new())),
            settings,
        )
    }

    #[tokio::test]
    async fn test_run_finds_identifier_and_releases_device() {
        let camera = Arc::new(SimulatedCamera::with_frames(vec![
            None,
            None,
            Some("SW001234"),
            Some("SW001234"),
        ]));
        let session = session_with(camera.clone());

        let outcome = session.run(None).await.unwrap();
        assert_eq!(outcome, ScanOutcome::Found("SW001234".to_string()));
        assert_eq!(session.last_identifier().await.as_deref(), Some("SW001234"));
        assert!(!session.is_device_held().await);
        assert!(!camera.is_held());
    }

    #[tokio::test]
    async fn test_unstable_read_is_not_committed() {
        let camera = Arc::new(SimulatedCamera::with_frames(vec![
            Some("SW00123"),
            Some("SW001234"),
            Some("SW001234"),
            Some("SW001234"),
        ]));
        let session = session_with(camera);

        let outcome = session.run(None).await.unwrap();
        assert_eq!(outcome, ScanOutcome::Found("SW001234".to_string()));
    }

    #[tokio::test]
    async fn test_permission_denied_is_terminal() {
        let camera = Arc::new(SimulatedCamera::new());
        camera.deny_permission(true);
        let session = session_with(camera);

        let outcome = session.run(None).await.unwrap();
        assert_eq!(outcome, ScanOutcome::Failed(ScanFailure::PermissionDenied));
        assert_eq!(session.last_error().await, Some(ScanFailure::PermissionDenied));

        assert_eq!(session.reset().await, ScanState::Idle);
    }

    #[tokio::test]
    async fn test_second_start_does_not_acquire_again() {
        let camera = Arc::new(SimulatedCamera::new());
        let session = session_with(camera.clone());

        assert_eq!(session.start(None).await.unwrap(), ScanState::Scanning);
        assert!(session.start(None).await.is_err());
        assert_eq!(camera.acquire_count(), 1);
        assert_eq!(session.state().await, ScanState::Scanning);
    }

    #[tokio::test]
    async fn test_upload_rejected_while_scanning() {
        let camera = Arc::new(SimulatedCamera::new());
        let session = session_with(camera);

        session.start(None).await.unwrap();
        let result = session.upload_image(b"SW001234").await;
        assert!(matches!(result, Err(SwasthyaError::InvalidStateTransition { .. })));
    }

    #[tokio::test]
    async fn test_take_identifier_hands_off_once() {
        let camera = Arc::new(SimulatedCamera::new());
        let session = session_with(camera);

        session.upload_image(b"SW001234").await.unwrap();
        assert_eq!(session.take_identifier().await.as_deref(), Some("SW001234"));
        assert_eq!(session.state().await, ScanState::Idle);
        assert_eq!(session.take_identifier().await, None);
    }
}
