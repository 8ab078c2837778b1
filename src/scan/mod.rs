//! 扫描流程
//!
//! - machine: 显式状态机（纯函数式转换）
//! - retry: 自动重试策略
//! - presenter: 结果展示和饮食记录生成
//! - timer: 重试等待的计时抽象

pub mod machine;
pub mod presenter;
pub mod retry;
pub mod timer;

pub use machine::{Effect, ScanInput, ScanSession, ScanSnapshot, ScanState, ScanStateKind};
pub use retry::{RetryDecision, RetryPolicy, DEFAULT_RETRY_DELAY, MAX_AUTO_RETRIES};
pub use timer::{Sleeper, TokioSleeper};
