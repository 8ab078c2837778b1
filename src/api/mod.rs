// 后端 API 客户端 - 共享的 HTTP 连接池和认证头

use anyhow::Result;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;

use crate::models::ApiSettings;

pub mod food_log;

pub use food_log::{FoodLogClient, FoodLogEntry, FoodLogSink, LoggedFood, MealType};

/// 图片分析接口路径
pub const ANALYZE_IMAGE_PATH: &str = "/api/food/analyze-image";
/// 饮食记录接口路径
pub const FOOD_LOG_PATH: &str = "/api/food/log";
/// 饮食记录列表接口路径
pub const FOOD_LOGS_PATH: &str = "/api/food/logs";

/// 后端 API 客户端（可克隆，克隆后共享连接池）
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl ApiClient {
    /// 按配置创建客户端
    pub fn new(settings: &ApiSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(format!("FoodScanner/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            auth_token: settings.auth_token.clone().filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 附加 Bearer 认证头
    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.post(self.url(path)))
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.get(self.url(path)))
    }
}
