// Actor模块 - 使用Actor模式管理扫描会话状态
//
// 用消息传递替代Arc<Mutex<T>>，会话的所有状态变化都在Actor任务中串行发生

pub mod scan_session;

pub use scan_session::{ScanCommand, ScanDependencies, ScanHandle, ScanSessionActor, SourceReply};
