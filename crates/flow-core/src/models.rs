//! 核心数据模型定义

use crate::vocabulary::{ActorClass, JourneyStage, QueuePriority, QueueState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 排队记录
///
/// 患者在某一站点候诊队列中的一次占位。`position` 是站点内单调
/// 分配的取号序号，取消后不回收也不重排；实时名次在读取时计算。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub station_id: Uuid,
    pub state: QueueState,
    pub position: i64,
    pub priority: QueuePriority,
    pub estimated_wait_minutes: Option<i64>, // 预估等待，仅供展示
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub called_at: Option<DateTime<Utc>>,
}

/// 状态流转日志条目，只追加，不更新不删除
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionLogEntry {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub from_stage: JourneyStage,
    pub to_stage: JourneyStage,
    pub action_label: String,
    pub actor_class: ActorClass,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl TransitionLogEntry {
    pub fn new(
        patient_id: Uuid,
        from_stage: JourneyStage,
        to_stage: JourneyStage,
        action_label: impl Into<String>,
        actor_class: ActorClass,
        note: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            from_stage,
            to_stage,
            action_label: action_label.into(),
            actor_class,
            note,
            recorded_at: Utc::now(),
        }
    }
}

/// 流转操作
///
/// 封闭的带标签变体集合，每个操作只携带自身需要的字段；
/// 未知的操作标签在反序列化边界直接拒绝。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum FlowAction {
    ScanTag { tag_code: String },
    Register,
    ConfirmArrival { station_id: Uuid, priority: QueuePriority },
    DeferEntry { station_id: Uuid },
    ResumeEntry { station_id: Uuid },
    CallPatient { station_id: Uuid },
    StartService { station_id: Uuid },
    CompleteExam { station_id: Uuid },
    MarkNoShow { station_id: Uuid },
    CancelQueue { station_id: Uuid, reason: String },
    ProceedToPayment,
    ConfirmPayment,
    StartNewVisit,
}

impl FlowAction {
    /// 去除载荷后的操作种类，用作转换表的键
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::ScanTag { .. } => ActionKind::ScanTag,
            Self::Register => ActionKind::Register,
            Self::ConfirmArrival { .. } => ActionKind::ConfirmArrival,
            Self::DeferEntry { .. } => ActionKind::DeferEntry,
            Self::ResumeEntry { .. } => ActionKind::ResumeEntry,
            Self::CallPatient { .. } => ActionKind::CallPatient,
            Self::StartService { .. } => ActionKind::StartService,
            Self::CompleteExam { .. } => ActionKind::CompleteExam,
            Self::MarkNoShow { .. } => ActionKind::MarkNoShow,
            Self::CancelQueue { .. } => ActionKind::CancelQueue,
            Self::ProceedToPayment => ActionKind::ProceedToPayment,
            Self::ConfirmPayment => ActionKind::ConfirmPayment,
            Self::StartNewVisit => ActionKind::StartNewVisit,
        }
    }
}

/// 操作种类
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ScanTag,
    Register,
    ConfirmArrival,
    DeferEntry,
    ResumeEntry,
    CallPatient,
    StartService,
    CompleteExam,
    MarkNoShow,
    CancelQueue,
    ProceedToPayment,
    ConfirmPayment,
    StartNewVisit,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScanTag => "scan_tag",
            Self::Register => "register",
            Self::ConfirmArrival => "confirm_arrival",
            Self::DeferEntry => "defer_entry",
            Self::ResumeEntry => "resume_entry",
            Self::CallPatient => "call_patient",
            Self::StartService => "start_service",
            Self::CompleteExam => "complete_exam",
            Self::MarkNoShow => "mark_no_show",
            Self::CancelQueue => "cancel_queue",
            Self::ProceedToPayment => "proceed_to_payment",
            Self::ConfirmPayment => "confirm_payment",
            Self::StartNewVisit => "start_new_visit",
        }
    }

    /// 操作者角色授权表：患者只能提交自助类操作，叫号等由工作人员提交
    pub fn allowed_for(&self, actor: &ActorClass) -> bool {
        match actor {
            ActorClass::System => true,
            ActorClass::Patient => matches!(
                self,
                Self::ScanTag
                    | Self::Register
                    | Self::ConfirmArrival
                    | Self::CancelQueue
                    | Self::ProceedToPayment
                    | Self::ConfirmPayment
                    | Self::StartNewVisit
            ),
            ActorClass::Staff => matches!(
                self,
                Self::DeferEntry
                    | Self::ResumeEntry
                    | Self::CallPatient
                    | Self::StartService
                    | Self::CompleteExam
                    | Self::MarkNoShow
                    | Self::CancelQueue
            ),
        }
    }
}

/// 操作请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub actor_id: Uuid,
    pub actor_class: ActorClass,
    pub patient_id: Uuid,
    pub action: FlowAction,
}

/// 操作结果：新的旅程阶段与该阶段下合法的后续操作
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub journey_stage: JourneyStage,
    pub available_actions: Vec<ActionKind>,
}

/// 快照中的排队记录摘要，`position` 为读取时刻计算的实时名次
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntrySummary {
    pub entry_id: Uuid,
    pub station_id: Uuid,
    pub state: QueueState,
    pub position: usize,
    pub priority: QueuePriority,
    pub estimated_wait_minutes: Option<i64>,
}

/// 患者快照，每次已提交的变更都会生成一条并推送给观察者
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSnapshot {
    pub patient_id: Uuid,
    /// 本次变更作用的站点；拉取式快照不对应单次变更，为空
    pub station_id: Option<Uuid>,
    pub journey_stage: JourneyStage,
    pub open_queue_entries: Vec<QueueEntrySummary>,
    pub timestamp: DateTime<Utc>,
}

/// 站点快照，按队列排序策略排列的当前候诊队列
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationSnapshot {
    pub station_id: Uuid,
    pub entries: Vec<QueueEntrySummary>,
    pub timestamp: DateTime<Utc>,
}

/// 全院快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilitySnapshot {
    pub stations: Vec<StationSnapshot>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trip() {
        let action = FlowAction::ConfirmArrival {
            station_id: Uuid::new_v4(),
            priority: QueuePriority::Normal,
        };
        let json = serde_json::to_string(&action).unwrap();
        let parsed: FlowAction = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, action);
        assert_eq!(parsed.kind(), ActionKind::ConfirmArrival);
    }

    #[test]
    fn test_unknown_action_tag_rejected() {
        let json = r#"{"action": "teleport", "payload": {}}"#;
        assert!(serde_json::from_str::<FlowAction>(json).is_err());
    }

    #[test]
    fn test_unit_action_deserializes_without_payload() {
        let json = r#"{"action": "register"}"#;
        let parsed: FlowAction = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, FlowAction::Register);
    }

    #[test]
    fn test_actor_authorization_table() {
        assert!(ActionKind::ScanTag.allowed_for(&ActorClass::Patient));
        assert!(!ActionKind::CallPatient.allowed_for(&ActorClass::Patient));
        assert!(ActionKind::CallPatient.allowed_for(&ActorClass::Staff));
        assert!(!ActionKind::Register.allowed_for(&ActorClass::Staff));
        assert!(ActionKind::CallPatient.allowed_for(&ActorClass::System));
    }
}
