// 图片分析客户端 - 向后端识别接口上传图片

use async_trait::async_trait;
use reqwest::multipart;
use tracing::{debug, info, warn};

use super::{classify_response, AnalysisOutcome, FoodAnalyzer};
use crate::api::{ApiClient, ANALYZE_IMAGE_PATH};
use crate::capture::UploadPayload;

/// 后端识别接口客户端
#[derive(Clone)]
pub struct AnalysisClient {
    api: ApiClient,
}

impl AnalysisClient {
    /// 创建客户端（接受共享的 API 客户端以复用连接池）
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn build_form(payload: &UploadPayload) -> reqwest::Result<multipart::Form> {
        let part = multipart::Part::bytes(payload.bytes().to_vec())
            .file_name(payload.file_name.clone())
            .mime_str(&payload.mime_type)?;
        Ok(multipart::Form::new().part("image", part))
    }
}

#[async_trait]
impl FoodAnalyzer for AnalysisClient {
    async fn analyze(&self, payload: &UploadPayload) -> AnalysisOutcome {
        let form = match Self::build_form(payload) {
            Ok(form) => form,
            Err(e) => return AnalysisOutcome::transient(format!("构建上传表单失败: {}", e)),
        };

        info!(
            "上传图片进行分析: {} ({} 字节)",
            payload.file_name,
            payload.len()
        );

        let response = match self.api.post(ANALYZE_IMAGE_PATH).multipart(form).send().await {
            Ok(response) => response,
            Err(e) => {
                let reason = if e.is_timeout() {
                    "请求超时".to_string()
                } else {
                    format!("网络错误: {}", e)
                };
                warn!("图片分析请求失败: {}", reason);
                return AnalysisOutcome::transient(reason);
            }
        };

        let status = response.status();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return AnalysisOutcome::transient(format!("读取响应失败: {}", e)),
        };
        debug!("分析响应: HTTP {} ({} 字节)", status.as_u16(), body.len());

        classify_response(status, &body)
    }
}
