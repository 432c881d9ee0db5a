//! 模拟摄像头
//!
//! 按脚本逐帧返回载荷，用于演示程序和测试。可以模拟权限拒绝、
//! 设备不可用，以及挂起申请或读帧以观察中间状态。

use crate::source::{CameraFacing, CaptureDevice, DeviceHandle, Frame};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use swasthya_core::{Result, SwasthyaError};
use tokio::sync::Notify;
use tracing::debug;

/// 模拟摄像头
#[derive(Debug, Default)]
pub struct SimulatedCamera {
    frames: Mutex<VecDeque<Option<String>>>,
    frame_delay: Mutex<Option<Duration>>,
    acquire_gate: Mutex<Option<Arc<Notify>>>,
    frame_gate: Mutex<Option<Arc<Notify>>>,
    deny_permission: AtomicBool,
    unavailable: AtomicBool,
    held: AtomicBool,
    acquire_count: AtomicUsize,
    release_count: AtomicUsize,
    sequence: AtomicU64,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimulatedCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序返回给定载荷，`None` 表示该帧没有二维码；脚本耗尽后一直返回空帧
    pub fn with_frames(frames: Vec<Option<&str>>) -> Self {
        let camera = Self::new();
        for frame in frames {
            camera.push_frame(frame);
        }
        camera
    }

    pub fn push_frame(&self, payload: Option<&str>) {
        locked(&self.frames).push_back(payload.map(str::to_string));
    }

    pub fn set_frame_delay(&self, delay: Duration) {
        *locked(&self.frame_delay) = Some(delay);
    }

    pub fn deny_permission(&self, deny: bool) {
        self.deny_permission.store(deny, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// 挂起后续的设备申请，直到返回的 `Notify` 被通知
    pub fn hold_acquisition(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *locked(&self.acquire_gate) = Some(gate.clone());
        gate
    }

    /// 挂起后续的读帧，直到返回的 `Notify` 被通知
    pub fn hold_frames(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *locked(&self.frame_gate) = Some(gate.clone());
        gate
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    pub fn acquire_count(&self) -> usize {
        self.acquire_count.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.release_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureDevice for SimulatedCamera {
    async fn acquire(&self, facing: CameraFacing) -> Result<DeviceHandle> {
        let gate = locked(&self.acquire_gate).take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.deny_permission.load(Ordering::SeqCst) {
            return Err(SwasthyaError::PermissionDenied(
                "camera permission denied by user".to_string(),
            ));
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SwasthyaError::DeviceUnavailable("no camera found".to_string()));
        }
        if self.held.swap(true, Ordering::SeqCst) {
            return Err(SwasthyaError::DeviceUnavailable("camera busy".to_string()));
        }

        self.acquire_count.fetch_add(1, Ordering::SeqCst);
        let handle = DeviceHandle::new(facing);
        debug!("Simulated camera {} opened", handle.id);
        Ok(handle)
    }

    async fn grab_frame(&self, handle: &DeviceHandle) -> Result<Frame> {
        let gate = locked(&self.frame_gate).take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let delay = *locked(&self.frame_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if !self.is_held() {
            return Err(SwasthyaError::DeviceUnavailable(format!(
                "device {} is not open",
                handle.id
            )));
        }

        let payload = locked(&self.frames).pop_front().flatten();
        Ok(Frame {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            data: payload.map(String::into_bytes).unwrap_or_default(),
        })
    }

    fn release(&self, handle: &DeviceHandle) {
        if self.held.swap(false, Ordering::SeqCst) {
            self.release_count.fetch_add(1, Ordering::SeqCst);
            debug!("Simulated camera {} closed", handle.id);
        }
    }
}
