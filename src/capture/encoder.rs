// 上传编码 - 把图片句柄打包成 multipart 上传内容

use image::ImageFormat;
use std::sync::Arc;
use tracing::debug;

use super::ImageHandle;
use crate::error::ScanError;

/// 未知格式时使用的 MIME 类型
pub const DEFAULT_MIME: &str = "image/jpeg";

/// 上传内容（同一次扫描的所有重试复用同一份内容）
#[derive(Clone, Debug, PartialEq)]
pub struct UploadPayload {
    /// 表单中的文件名，形如 photo.jpg
    pub file_name: String,
    pub mime_type: String,
    bytes: Arc<[u8]>,
}

impl UploadPayload {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// 根据扩展名推断 MIME 类型
pub fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

/// 根据文件内容推断格式，返回 (MIME, 扩展名)
fn sniff_format(bytes: &[u8]) -> Option<(&'static str, &'static str)> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Jpeg => Some(("image/jpeg", "jpg")),
        ImageFormat::Png => Some(("image/png", "png")),
        ImageFormat::Gif => Some(("image/gif", "gif")),
        ImageFormat::WebP => Some(("image/webp", "webp")),
        ImageFormat::Bmp => Some(("image/bmp", "bmp")),
        ImageFormat::Tiff => Some(("image/tiff", "tiff")),
        _ => None,
    }
}

/// 上传编码器
pub struct UploadEncoder;

impl UploadEncoder {
    /// 读取图片并生成上传内容
    pub async fn encode(handle: &ImageHandle) -> Result<UploadPayload, ScanError> {
        if handle.path().file_name().is_none() {
            return Err(ScanError::InvalidImage(format!(
                "图片路径无效: {:?}",
                handle.path()
            )));
        }

        let bytes = tokio::fs::read(handle.path())
            .await
            .map_err(|e| ScanError::InvalidImage(format!("读取图片失败: {}", e)))?;

        Self::encode_bytes(handle, bytes)
    }

    /// 由已读取的内容生成上传内容
    pub fn encode_bytes(handle: &ImageHandle, bytes: Vec<u8>) -> Result<UploadPayload, ScanError> {
        if bytes.is_empty() {
            return Err(ScanError::InvalidImage("图片文件为空".to_string()));
        }

        let extension = handle.extension();
        let known = extension.as_deref().and_then(mime_from_extension);
        let (mime, ext) = match (known, extension) {
            (Some(mime), Some(ext)) => (mime, ext),
            (_, extension) => match sniff_format(&bytes) {
                Some((mime, ext)) => (mime, ext.to_string()),
                None => (DEFAULT_MIME, extension.unwrap_or_else(|| "jpg".to_string())),
            },
        };

        debug!(
            "图片编码完成: photo.{} ({}, {} 字节)",
            ext,
            mime,
            bytes.len()
        );

        Ok(UploadPayload::new(format!("photo.{}", ext), mime, bytes))
    }
}
