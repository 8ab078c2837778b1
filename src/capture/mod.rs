// 图片来源模块 - 负责拍照和从图库选择图片
//
// 相机权限、相机和图库都是外部设备，通过 trait 注入

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ScanError;

pub mod encoder;

pub use encoder::{UploadEncoder, UploadPayload};

/// 本地图片句柄（拍照或选图得到的文件路径）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHandle {
    path: PathBuf,
}

impl ImageHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 小写的文件扩展名
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

/// 相机权限状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// 拍照结果
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureOutcome {
    Captured(ImageHandle),
    Denied,
    Cancelled,
}

/// 选图结果
#[derive(Clone, Debug, PartialEq)]
pub enum PickOutcome {
    Selected(ImageHandle),
    Cancelled,
}

/// 相机权限提供者
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// 查询相机权限（由外部授予，这里不再弹窗）
    async fn camera_permission(&self) -> PermissionStatus;
}

/// 相机设备
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// 拍照，返回 None 表示用户关闭了相机
    async fn take_photo(&self) -> Result<Option<PathBuf>, ScanError>;
}

/// 图库选择器
#[async_trait]
pub trait ImagePicker: Send + Sync {
    /// 选择图片，返回 None 表示用户取消
    async fn pick_image(&self) -> Result<Option<PathBuf>, ScanError>;
}

/// 固定结果的权限提供者
pub struct StaticPermission(pub PermissionStatus);

#[async_trait]
impl PermissionProvider for StaticPermission {
    async fn camera_permission(&self) -> PermissionStatus {
        self.0
    }
}

/// 返回预设文件路径的选择器（命令行入口使用）
pub struct FilePicker {
    path: Option<PathBuf>,
}

impl FilePicker {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ImagePicker for FilePicker {
    async fn pick_image(&self) -> Result<Option<PathBuf>, ScanError> {
        Ok(self.path.clone())
    }
}

/// 没有相机的环境
pub struct NoCamera;

#[async_trait]
impl CameraDevice for NoCamera {
    async fn take_photo(&self) -> Result<Option<PathBuf>, ScanError> {
        Err(ScanError::Device("当前环境没有可用的相机".to_string()))
    }
}

/// 图片来源 - 组合权限、相机和图库
#[derive(Clone)]
pub struct ImageSource {
    permission: Arc<dyn PermissionProvider>,
    camera: Arc<dyn CameraDevice>,
    picker: Arc<dyn ImagePicker>,
}

impl ImageSource {
    pub fn new(
        permission: Arc<dyn PermissionProvider>,
        camera: Arc<dyn CameraDevice>,
        picker: Arc<dyn ImagePicker>,
    ) -> Self {
        Self {
            permission,
            camera,
            picker,
        }
    }

    /// 拍照
    ///
    /// 权限未授予时直接返回 `Denied`，由调用方提示用户去授权
    pub async fn capture(&self) -> Result<CaptureOutcome, ScanError> {
        if self.permission.camera_permission().await != PermissionStatus::Granted {
            warn!("相机权限未授予，跳过拍照");
            return Ok(CaptureOutcome::Denied);
        }

        match self.camera.take_photo().await? {
            Some(path) => {
                info!("拍照完成: {:?}", path);
                Ok(CaptureOutcome::Captured(ImageHandle::new(path)))
            }
            None => {
                info!("用户取消了拍照");
                Ok(CaptureOutcome::Cancelled)
            }
        }
    }

    /// 从图库选择图片
    pub async fn pick(&self) -> Result<PickOutcome, ScanError> {
        match self.picker.pick_image().await? {
            Some(path) => {
                info!("已选择图片: {:?}", path);
                Ok(PickOutcome::Selected(ImageHandle::new(path)))
            }
            None => {
                info!("用户取消了选图");
                Ok(PickOutcome::Cancelled)
            }
        }
    }
}
