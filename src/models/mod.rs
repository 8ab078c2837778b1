// 数据模型模块 - 配置相关的数据结构

use serde::{Deserialize, Serialize};

use crate::api::MealType;

/// 默认后端地址
pub const DEFAULT_API_URL: &str = "http://localhost:5000";

/// 后端连接配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSettings {
    /// 后端地址
    #[serde(default = "default_api_url")]
    pub base_url: String,
    /// Bearer 认证 token（登录流程由外部负责）
    #[serde(default)]
    pub auth_token: Option<String>,
    /// 单次请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            auth_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// 应用配置（部分更新，None 表示不修改）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub api_url: Option<String>,
    pub auth_token: Option<String>,
    pub timeout_secs: Option<u64>,
    pub default_meal_type: Option<MealType>,
    pub log_broadcast: Option<bool>,
}

/// 持久化的应用配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedAppConfig {
    #[serde(default)]
    pub api: ApiSettings,
    /// 提交时默认的餐次
    #[serde(default)]
    pub default_meal_type: MealType,
    /// 是否把日志推送给界面
    #[serde(default = "default_true")]
    pub log_broadcast: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PersistedAppConfig {
    fn default() -> Self {
        Self {
            api: ApiSettings::default(),
            default_meal_type: MealType::default(),
            log_broadcast: true,
        }
    }
}
