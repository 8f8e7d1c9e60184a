//! 状态词汇表
//!
//! 定义就诊旅程阶段、队列状态、优先级和角色的封闭集合，
//! 以及队列状态与旅程阶段之间的双向映射。
//! 历史版本遗留的同义标签在读取边界统一归一化，业务逻辑中
//! 不允许出现字符串形式的状态比较。

use crate::error::{FlowError, Result};
use crate::models::QueueEntry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 就诊旅程阶段
///
/// 每位患者同一时刻只有一个当前阶段，仅由流转协调器写入。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStage {
    Unregistered,
    Arrived,
    Registered,
    Waiting,
    Called,
    InService,
    Completed,
    AwaitingPayment,
    Finished,
}

impl JourneyStage {
    /// 规范化标签
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::Arrived => "arrived",
            Self::Registered => "registered",
            Self::Waiting => "waiting",
            Self::Called => "called",
            Self::InService => "in_service",
            Self::Completed => "completed",
            Self::AwaitingPayment => "awaiting_payment",
            Self::Finished => "finished",
        }
    }

    /// 解析存储标签，接受规范标签与已知的遗留同义词
    pub fn parse_label(label: &str) -> Result<Self> {
        let stage = match label {
            "unregistered" => Self::Unregistered,
            "arrived" | "checked_in" => Self::Arrived,
            "registered" => Self::Registered,
            "waiting" | "queued" | "queueing" => Self::Waiting,
            "called" => Self::Called,
            "in_service" | "ongoing" | "in_progress" => Self::InService,
            "completed" | "done" => Self::Completed,
            "awaiting_payment" | "paying" => Self::AwaitingPayment,
            "finished" | "closed" => Self::Finished,
            other => {
                return Err(FlowError::Validation(format!(
                    "未知的旅程阶段标签: {}",
                    other
                )))
            }
        };

        if stage.as_str() != label {
            tracing::debug!("normalized legacy stage label '{}' to '{}'", label, stage.as_str());
        }

        Ok(stage)
    }

    /// 标签是否已是规范形式
    pub fn is_canonical_label(label: &str) -> bool {
        Self::parse_label(label)
            .map(|stage| stage.as_str() == label)
            .unwrap_or(false)
    }

    /// 是否为活动阶段（患者应持有排队记录的阶段）
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Waiting | Self::Called | Self::InService)
    }

    /// 词汇表中的全部阶段
    pub fn all() -> Vec<JourneyStage> {
        vec![
            Self::Unregistered,
            Self::Arrived,
            Self::Registered,
            Self::Waiting,
            Self::Called,
            Self::InService,
            Self::Completed,
            Self::AwaitingPayment,
            Self::Finished,
        ]
    }
}

impl fmt::Display for JourneyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 站点级队列状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Waiting,
    Delayed,
    Called,
    NoShow,
    InService,
    Completed,
    Cancelled,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Delayed => "delayed",
            Self::Called => "called",
            Self::NoShow => "no_show",
            Self::InService => "in_service",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// 解析存储标签，接受规范标签与已知的遗留同义词
    pub fn parse_label(label: &str) -> Result<Self> {
        let state = match label {
            "waiting" | "queued" => Self::Waiting,
            "delayed" | "deferred" => Self::Delayed,
            "called" => Self::Called,
            "no_show" | "skipped" => Self::NoShow,
            "in_service" | "ongoing" | "in_progress" => Self::InService,
            "completed" | "done" => Self::Completed,
            "cancelled" | "canceled" => Self::Cancelled,
            other => {
                return Err(FlowError::Validation(format!(
                    "未知的队列状态标签: {}",
                    other
                )))
            }
        };

        if state.as_str() != label {
            tracing::debug!("normalized legacy queue label '{}' to '{}'", label, state.as_str());
        }

        Ok(state)
    }

    /// 终态记录不再占用排队位置
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }

    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 排队优先级，紧急优先于普通
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueuePriority {
    Urgent,
    Normal,
}

/// 操作者角色，由身份协作方解析，引擎仅信任其结果
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActorClass {
    Patient,
    Staff,
    System,
}

/// 队列状态到旅程阶段的映射（对队列状态全集有定义）
pub fn queue_to_journey(state: &QueueState) -> JourneyStage {
    match state {
        QueueState::Waiting | QueueState::Delayed => JourneyStage::Waiting,
        QueueState::Called => JourneyStage::Called,
        QueueState::InService => JourneyStage::InService,
        QueueState::Completed => JourneyStage::Completed,
        QueueState::Cancelled | QueueState::NoShow => JourneyStage::Registered,
    }
}

/// 旅程阶段到队列状态的反向映射（仅对活动类阶段有定义）
pub fn journey_to_queue(stage: &JourneyStage) -> Option<QueueState> {
    match stage {
        JourneyStage::Waiting => Some(QueueState::Waiting),
        JourneyStage::Called => Some(QueueState::Called),
        JourneyStage::InService => Some(QueueState::InService),
        JourneyStage::Completed => Some(QueueState::Completed),
        _ => None,
    }
}

/// 队列状态在推导旅程阶段时的排序权重，数值大者优先
fn state_rank(state: &QueueState) -> u8 {
    match state {
        QueueState::InService => 3,
        QueueState::Called => 2,
        QueueState::Waiting | QueueState::Delayed => 1,
        _ => 0,
    }
}

/// 由患者当前未结束的排队记录推导旅程阶段
///
/// 取最高优先级的未结束记录：优先级类别在前，随后已叫号/服务中
/// 的记录排在候诊记录之前（按叫号时间先后），最后按排队序号。
/// 无未结束记录时返回 `None`。
pub fn derive_stage_from_entries(entries: &[QueueEntry]) -> Option<JourneyStage> {
    entries
        .iter()
        .filter(|entry| entry.state.is_open())
        .min_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(state_rank(&b.state).cmp(&state_rank(&a.state)))
                .then(a.called_at.cmp(&b.called_at))
                .then(a.position.cmp(&b.position))
        })
        .map(|entry| queue_to_journey(&entry.state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn entry(state: QueueState, priority: QueuePriority, position: i64) -> QueueEntry {
        QueueEntry {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            station_id: Uuid::new_v4(),
            state,
            position,
            priority,
            estimated_wait_minutes: None,
            cancel_reason: None,
            created_at: Utc::now(),
            called_at: None,
        }
    }

    #[test]
    fn test_mapping_near_inverse() {
        // 对每个有反向映射的阶段，往返后语义不变
        for state in [
            QueueState::Waiting,
            QueueState::Delayed,
            QueueState::Called,
            QueueState::InService,
            QueueState::Completed,
        ] {
            let stage = queue_to_journey(&state);
            let back = journey_to_queue(&stage).unwrap();
            // 往返结果与原状态属同一等价类
            assert_eq!(queue_to_journey(&back), stage);
        }

        // Waiting 与 Delayed 同属候诊等价类，反向映射取规范代表
        assert_eq!(queue_to_journey(&QueueState::Delayed), JourneyStage::Waiting);
        assert_eq!(journey_to_queue(&JourneyStage::Waiting), Some(QueueState::Waiting));
    }

    #[test]
    fn test_reverse_mapping_undefined_outside_active_stages() {
        assert!(journey_to_queue(&JourneyStage::Unregistered).is_none());
        assert!(journey_to_queue(&JourneyStage::AwaitingPayment).is_none());
        assert!(journey_to_queue(&JourneyStage::Finished).is_none());
    }

    #[test]
    fn test_legacy_label_normalization() {
        // 遗留标签解析后与规范标签处处相等
        let stage = JourneyStage::parse_label("ongoing").unwrap();
        assert_eq!(stage, JourneyStage::InService);
        assert_eq!(stage.as_str(), "in_service");
        assert_eq!(stage, JourneyStage::parse_label("in_service").unwrap());

        assert_eq!(QueueState::parse_label("queued").unwrap(), QueueState::Waiting);
        assert_eq!(QueueState::parse_label("canceled").unwrap(), QueueState::Cancelled);

        assert!(JourneyStage::parse_label("teleported").is_err());
    }

    #[test]
    fn test_is_canonical_label() {
        assert!(JourneyStage::is_canonical_label("waiting"));
        assert!(!JourneyStage::is_canonical_label("ongoing"));
        assert!(!JourneyStage::is_canonical_label("nonsense"));
    }

    #[test]
    fn test_derive_stage_prefers_priority_then_state() {
        // 紧急候诊记录优先于普通候诊记录
        let entries = vec![
            entry(QueueState::Waiting, QueuePriority::Normal, 1),
            entry(QueueState::Waiting, QueuePriority::Urgent, 2),
        ];
        assert_eq!(derive_stage_from_entries(&entries), Some(JourneyStage::Waiting));

        // 同一优先级下，已叫号记录领先于候诊记录
        let entries = vec![
            entry(QueueState::Waiting, QueuePriority::Normal, 1),
            entry(QueueState::Called, QueuePriority::Normal, 2),
        ];
        assert_eq!(derive_stage_from_entries(&entries), Some(JourneyStage::Called));
    }

    #[test]
    fn test_derive_stage_ignores_terminal_entries() {
        let entries = vec![
            entry(QueueState::Cancelled, QueuePriority::Urgent, 1),
            entry(QueueState::Waiting, QueuePriority::Normal, 2),
        ];
        assert_eq!(derive_stage_from_entries(&entries), Some(JourneyStage::Waiting));

        let entries = vec![entry(QueueState::Completed, QueuePriority::Normal, 1)];
        assert_eq!(derive_stage_from_entries(&entries), None);
    }
}
