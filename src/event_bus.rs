// 事件总线 - 把扫描会话的进展推送给界面
//
// 使用 tokio::sync::broadcast 实现发布/订阅，界面可以有多个订阅者

use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::analysis::AnalysisResult;
use crate::api::LoggedFood;

/// 扫描事件
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    // --- 分析事件 ---

    /// 开始（或重新）上传分析
    AnalysisStarted {
        session_id: Uuid,
        generation: u64,
        attempt: u8,
    },

    /// 分析失败，已安排自动重试
    RetryScheduled {
        session_id: Uuid,
        attempt: u8,
        delay: Duration,
        reason: String,
    },

    AnalysisSucceeded {
        session_id: Uuid,
        result: AnalysisResult,
    },

    /// 图片不是食物，等待用户选择重拍或取消
    NotFoodDetected {
        session_id: Uuid,
        message: Option<String>,
    },

    /// 自动重试用尽，等待用户手动重试或取消
    AnalysisFailed {
        session_id: Uuid,
        reason: String,
    },

    /// 图片无法编码
    ImageRejected {
        session_id: Uuid,
        reason: String,
    },

    /// 会话回到空闲状态
    SessionReset {
        session_id: Uuid,
    },

    // --- 提交事件 ---

    LogCommitted {
        session_id: Uuid,
        logged: LoggedFood,
    },

    CommitFailed {
        session_id: Uuid,
        reason: String,
    },
}

impl ScanEvent {
    /// 是否是需要用户处理的结束事件
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanEvent::AnalysisSucceeded { .. }
                | ScanEvent::NotFoodDetected { .. }
                | ScanEvent::AnalysisFailed { .. }
                | ScanEvent::ImageRejected { .. }
        )
    }
}

/// 事件总线
pub struct EventBus {
    sender: broadcast::Sender<ScanEvent>,
}

impl EventBus {
    /// 创建新的事件总线
    ///
    /// # 参数
    /// - `capacity`: 事件缓冲区大小
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 发布事件
    ///
    /// 没有订阅者时事件被丢弃
    pub fn publish(&self, event: ScanEvent) {
        match self.sender.send(event) {
            Ok(receiver_count) => {
                tracing::trace!("事件已发布，订阅者数量: {}", receiver_count);
            }
            Err(_) => {
                tracing::trace!("事件已发布但无订阅者");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }
}
