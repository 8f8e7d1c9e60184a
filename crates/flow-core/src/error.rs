//! 错误定义模块

use thiserror::Error;
use uuid::Uuid;

/// 患者流转系统统一错误类型
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("无效操作: 阶段 {stage} 不允许执行 {action}")]
    InvalidAction { stage: String, action: String },

    #[error("重复排队: 患者 {patient_id} 在站点 {station_id} 已有未结束的排队记录 {existing_entry_id}")]
    DuplicateOpenEntry {
        patient_id: Uuid,
        station_id: Uuid,
        existing_entry_id: Uuid,
    },

    #[error("无效队列状态转换: 从 {from} 到 {to}")]
    InvalidEntryTransition { from: String, to: String },

    #[error("患者 {0} 尚未初始化就诊状态")]
    NoState(Uuid),

    #[error("通知投递失败: {0}")]
    NotificationDelivery(String),

    #[error("权限错误: {0}")]
    Permission(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// 患者流转系统统一结果类型
pub type Result<T> = std::result::Result<T, FlowError>;
