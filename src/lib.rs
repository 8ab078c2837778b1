// 食物扫描客户端 - 主库
//
// 拍照/选图 → 编码上传 → 后端识别（失败自动重试）→ 展示结果 → 提交饮食记录

pub mod actors;
pub mod analysis;
pub mod api;
pub mod capture;
pub mod error;
pub mod event_bus;
pub mod logger;
pub mod models;
pub mod scan;
pub mod settings;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use actors::{ScanDependencies, ScanHandle, ScanSessionActor};
use analysis::AnalysisClient;
use api::{ApiClient, FoodLogClient};
use capture::ImageSource;
use event_bus::EventBus;
use scan::{RetryPolicy, TokioSleeper};
use settings::SettingsManager;

pub use error::ScanError;

/// 事件总线容量
const EVENT_BUS_CAPACITY: usize = 256;

/// 应用状态 - 持有配置、事件总线和共享的后端客户端
pub struct ScannerApp {
    settings: Arc<SettingsManager>,
    events: Arc<EventBus>,
    analysis_client: AnalysisClient,
    food_logs: FoodLogClient,
}

impl ScannerApp {
    /// 按当前配置（含环境变量覆盖）创建应用
    pub async fn new(settings: Arc<SettingsManager>) -> Result<Self> {
        let config = settings.effective().await;
        let api = ApiClient::new(&config.api)?;
        info!("后端地址: {}", api.base_url());

        Ok(Self {
            settings,
            events: Arc::new(EventBus::new(EVENT_BUS_CAPACITY)),
            analysis_client: AnalysisClient::new(api.clone()),
            food_logs: FoodLogClient::new(api),
        })
    }

    pub fn settings(&self) -> &Arc<SettingsManager> {
        &self.settings
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn food_logs(&self) -> &FoodLogClient {
        &self.food_logs
    }

    /// 打开一个扫描会话（每个扫描界面一个），Actor 在后台运行
    pub async fn open_session(&self, source: ImageSource) -> ScanHandle {
        let config = self.settings.effective().await;
        let deps = ScanDependencies {
            source,
            analyzer: Arc::new(self.analysis_client.clone()),
            log_sink: Arc::new(self.food_logs.clone()),
            sleeper: Arc::new(TokioSleeper),
            events: self.events.clone(),
            default_meal_type: config.default_meal_type,
        };

        let (actor, handle) = ScanSessionActor::new(deps, RetryPolicy::default());
        tokio::spawn(async move {
            actor.run().await;
        });
        handle
    }
}
