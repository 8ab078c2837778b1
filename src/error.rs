// 扫描流程错误定义

use thiserror::Error;

/// 扫描流程中会暴露给用户的错误
///
/// 用户取消选择图片不是错误，不在此列
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    /// 相机权限未授予，需要用户先去系统设置授权
    #[error("相机权限未授予")]
    PermissionDenied,

    /// 图片无法读取或编码，只能换一张图片
    #[error("无效的图片: {0}")]
    InvalidImage(String),

    /// 网络、服务端或响应解析问题
    #[error("图片分析失败: {0}")]
    TransientFailure(String),

    /// 饮食记录提交失败，分析结果仍然保留
    #[error("保存饮食记录失败: {0}")]
    CommitFailed(String),

    /// 会话中已有进行中的提交
    #[error("当前会话正忙: {0}")]
    Busy(&'static str),

    /// 当前状态不接受该操作
    #[error("当前状态不允许该操作: {0}")]
    InvalidTransition(&'static str),

    #[error("扫描会话已停止")]
    SessionClosed,

    /// 外部设备（相机、图库）自身报错
    #[error("设备错误: {0}")]
    Device(String),
}
