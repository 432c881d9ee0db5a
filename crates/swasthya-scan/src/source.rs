//! 扫描源
//!
//! 管理采集设备（摄像头）并从画面或上传图片中提取标识符。
//! 采集设备为全局单例，同一时刻最多只有一个租约。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use swasthya_core::{Result, SwasthyaError};
use tracing::{debug, warn};
use uuid::Uuid;

/// 摄像头朝向
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    Front,
    #[default]
    Back,
}

/// 设备句柄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub id: Uuid,
    pub facing: CameraFacing,
}

impl DeviceHandle {
    pub fn new(facing: CameraFacing) -> Self {
        Self {
            id: Uuid::new_v4(),
            facing,
        }
    }
}

/// 一帧采集画面
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub data: Vec<u8>,
}

/// 采集设备提供者
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// 申请设备，失败时返回 `PermissionDenied` 或 `DeviceUnavailable`
    ///
    /// 设备已被打开时必须返回 `DeviceUnavailable`。
    async fn acquire(&self, facing: CameraFacing) -> Result<DeviceHandle>;

    /// 读取一帧画面
    async fn grab_frame(&self, handle: &DeviceHandle) -> Result<Frame>;

    /// 释放设备。同步调用，以便在 `Drop` 中使用
    fn release(&self, handle: &DeviceHandle);
}

/// 二维码解码提供者
#[async_trait]
pub trait CodeDecoder: Send + Sync {
    /// 从画面中解码，没有二维码时返回 `None`
    async fn decode_frame(&self, frame: &Frame) -> Option<String>;

    /// 从静态图片中解码
    async fn decode_image(&self, bytes: &[u8]) -> Option<String>;
}

/// 设备租约
///
/// 持有期间独占采集设备；显式 `release` 或丢弃时释放，重复释放无副作用。
pub struct DeviceLease {
    handle: DeviceHandle,
    device: Arc<dyn CaptureDevice>,
    in_use: Arc<AtomicBool>,
    released: AtomicBool,
}

impl DeviceLease {
    pub fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// 释放设备
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        self.device.release(&self.handle);
        self.in_use.store(false, Ordering::SeqCst);
        debug!("Capture device {} released", self.handle.id);
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for DeviceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLease")
            .field("handle", &self.handle)
            .field("released", &self.is_released())
            .finish()
    }
}

/// 申请过程中的占用标记，申请未完成就被丢弃时自动归还
struct AcquireGuard {
    in_use: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for AcquireGuard {
    fn drop(&mut self) {
        if self.armed {
            self.in_use.store(false, Ordering::SeqCst);
        }
    }
}

/// 扫描源
pub struct ScanSource {
    device: Arc<dyn CaptureDevice>,
    decoder: Arc<dyn CodeDecoder>,
    in_use: Arc<AtomicBool>,
}

impl ScanSource {
    /// 创建新的扫描源
    ///
    /// 占用标记属于扫描源本身。同一设备需要多个扫描源时应通过 `share_device`
    /// 派生，否则只能依靠设备自身拒绝重复打开。
    pub fn new(device: Arc<dyn CaptureDevice>, decoder: Arc<dyn CodeDecoder>) -> Self {
        Self {
            device,
            decoder,
            in_use: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 派生共享同一设备和占用标记的扫描源，可换用另一种解码器
    pub fn share_device(&self, decoder: Arc<dyn CodeDecoder>) -> Self {
        Self {
            device: self.device.clone(),
            decoder,
            in_use: self.in_use.clone(),
        }
    }

    /// 是否存在未释放的设备租约
    pub fn is_device_in_use(&self) -> bool {
        self.in_use.load(Ordering::SeqCst)
    }

    /// 申请采集设备
    pub async fn acquire_device(&self, facing: CameraFacing) -> Result<DeviceLease> {
        if self
            .in_use
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SwasthyaError::DeviceUnavailable(
                "capture device already in use".to_string(),
            ));
        }

        let mut guard = AcquireGuard {
            in_use: self.in_use.clone(),
            armed: true,
        };

        let handle = self.device.acquire(facing).await?;
        guard.armed = false;

        debug!("Capture device {} acquired ({:?})", handle.id, facing);
        Ok(DeviceLease {
            handle,
            device: self.device.clone(),
            in_use: self.in_use.clone(),
            released: AtomicBool::new(false),
        })
    }

    /// 解码当前画面；读帧失败按"未发现"处理
    pub async fn decode_frame(&self, lease: &DeviceLease) -> Option<String> {
        if lease.is_released() {
            return None;
        }

        match self.device.grab_frame(lease.handle()).await {
            Ok(frame) => self.decoder.decode_frame(&frame).await,
            Err(e) => {
                warn!("Frame grab failed on device {}: {}", lease.handle().id, e);
                None
            }
        }
    }

    /// 解码上传的图片
    pub async fn decode_image(&self, bytes: &[u8]) -> Result<String> {
        if bytes.is_empty() {
            return Err(SwasthyaError::NoCodeFound);
        }

        self.decoder
            .decode_image(bytes)
            .await
            .ok_or(SwasthyaError::NoCodeFound)
    }

    /// 释放设备租约
    pub fn release_device(&self, lease: &DeviceLease) {
        lease.release();
    }
}

impl std::fmt::Debug for ScanSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanSource")
            .field("in_use", &self.is_device_in_use())
            .finish()
    }
}
