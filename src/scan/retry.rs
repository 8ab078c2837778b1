// 自动重试策略 - 固定次数、固定间隔，不做指数退避，也不开放配置

use std::time::Duration;

/// 自动重试次数上限（首次请求之外）
pub const MAX_AUTO_RETRIES: u8 = 2;
/// 重试间隔
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// 重试决策
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// 等待 `delay` 后发起第 `attempt` 次重试
    Retry { attempt: u8, delay: Duration },
    GiveUp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_auto_retries: u8,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_auto_retries: MAX_AUTO_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn max_auto_retries(&self) -> u8 {
        self.max_auto_retries
    }

    /// 根据已完成的重试次数决定下一步
    pub fn decide(&self, attempt: u8) -> RetryDecision {
        if attempt < self.max_auto_retries {
            RetryDecision::Retry {
                attempt: attempt + 1,
                delay: self.delay,
            }
        } else {
            RetryDecision::GiveUp
        }
    }
}
