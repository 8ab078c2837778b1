use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::models::{AppConfig, PersistedAppConfig};

/// 覆盖后端地址的环境变量
pub const ENV_API_URL: &str = "FOOD_SCANNER_API_URL";
/// 覆盖认证 token 的环境变量
pub const ENV_TOKEN: &str = "FOOD_SCANNER_TOKEN";

/// 默认配置文件路径
pub fn default_settings_path() -> PathBuf {
    let base = if cfg!(target_os = "macos") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join("Library/Application Support")
    } else if cfg!(target_os = "windows") {
        PathBuf::from(std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string()))
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".config")
    };
    base.join("food-scanner").join("settings.json")
}

/// 修正文件里或更新中不合法的值
fn sanitize(config: &mut PersistedAppConfig) {
    if config.api.timeout_secs == 0 {
        warn!("请求超时不能为 0 秒，按 1 秒处理");
        config.api.timeout_secs = 1;
    }
}

pub struct SettingsManager {
    path: PathBuf,
    data: RwLock<PersistedAppConfig>,
}

impl SettingsManager {
    pub async fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut initial = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => {
                serde_json::from_slice::<PersistedAppConfig>(&bytes).unwrap_or_else(|e| {
                    warn!("配置文件解析失败，使用默认配置: {}", e);
                    PersistedAppConfig::default()
                })
            }
            _ => {
                let default = PersistedAppConfig::default();
                let json = serde_json::to_string_pretty(&default)?;
                tokio::fs::write(&path, json).await?;
                info!("已创建默认配置: {:?}", path);
                default
            }
        };

        sanitize(&mut initial);

        Ok(Self {
            path,
            data: RwLock::new(initial),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self) -> PersistedAppConfig {
        self.data.read().await.clone()
    }

    /// 获取配置并应用环境变量覆盖（不写回文件）
    pub async fn effective(&self) -> PersistedAppConfig {
        let mut config = self.get().await;
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.is_empty() {
                config.api.base_url = url;
            }
        }
        if let Ok(token) = std::env::var(ENV_TOKEN) {
            if !token.is_empty() {
                config.api.auth_token = Some(token);
            }
        }
        config
    }

    pub async fn update(&self, update: AppConfig) -> Result<PersistedAppConfig> {
        let mut config = self.data.write().await;

        if let Some(url) = update.api_url {
            config.api.base_url = url;
        }
        if let Some(token) = update.auth_token {
            config.api.auth_token = if token.is_empty() { None } else { Some(token) };
        }
        if let Some(timeout) = update.timeout_secs {
            config.api.timeout_secs = timeout;
        }
        if let Some(meal_type) = update.default_meal_type {
            config.default_meal_type = meal_type;
        }
        if let Some(enabled) = update.log_broadcast {
            config.log_broadcast = enabled;
        }

        sanitize(&mut config);
        self.save(&config).await?;
        Ok(config.clone())
    }

    async fn save(&self, config: &PersistedAppConfig) -> Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
