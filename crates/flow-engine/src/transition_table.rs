//! 旅程转换表
//!
//! 静态转换图：对每个旅程阶段列出合法操作及其产生的新阶段，
//! 是操作合法性的唯一事实来源。表对操作全集是全函数：
//! 未列出的组合返回显式的无效操作错误，而不是静默无操作。

use flow_core::{ActionKind, FlowError, JourneyStage, Result};
use std::collections::HashMap;

/// 旅程转换表
#[derive(Debug)]
pub struct JourneyTransitionTable {
    transitions: HashMap<(JourneyStage, ActionKind), JourneyStage>,
}

impl JourneyTransitionTable {
    /// 创建新的转换表实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert(
            (JourneyStage::Unregistered, ActionKind::ScanTag),
            JourneyStage::Arrived,
        );
        transitions.insert(
            (JourneyStage::Arrived, ActionKind::Register),
            JourneyStage::Registered,
        );

        // 候诊中与完成单项检查后都可以再加入其他站点的队列
        transitions.insert(
            (JourneyStage::Registered, ActionKind::ConfirmArrival),
            JourneyStage::Waiting,
        );
        transitions.insert(
            (JourneyStage::Waiting, ActionKind::ConfirmArrival),
            JourneyStage::Waiting,
        );
        transitions.insert(
            (JourneyStage::Completed, ActionKind::ConfirmArrival),
            JourneyStage::Waiting,
        );

        transitions.insert(
            (JourneyStage::Waiting, ActionKind::DeferEntry),
            JourneyStage::Waiting,
        );
        transitions.insert(
            (JourneyStage::Waiting, ActionKind::ResumeEntry),
            JourneyStage::Waiting,
        );
        transitions.insert(
            (JourneyStage::Waiting, ActionKind::CallPatient),
            JourneyStage::Called,
        );
        transitions.insert(
            (JourneyStage::Called, ActionKind::StartService),
            JourneyStage::InService,
        );
        transitions.insert(
            (JourneyStage::Called, ActionKind::MarkNoShow),
            JourneyStage::Registered,
        );
        transitions.insert(
            (JourneyStage::Waiting, ActionKind::CancelQueue),
            JourneyStage::Registered,
        );
        transitions.insert(
            (JourneyStage::Called, ActionKind::CancelQueue),
            JourneyStage::Registered,
        );
        transitions.insert(
            (JourneyStage::InService, ActionKind::CompleteExam),
            JourneyStage::Completed,
        );

        transitions.insert(
            (JourneyStage::Completed, ActionKind::ProceedToPayment),
            JourneyStage::AwaitingPayment,
        );
        transitions.insert(
            (JourneyStage::AwaitingPayment, ActionKind::ConfirmPayment),
            JourneyStage::Finished,
        );

        // 结束即回到未登记，开启下一次就诊循环
        transitions.insert(
            (JourneyStage::Finished, ActionKind::StartNewVisit),
            JourneyStage::Unregistered,
        );

        Self { transitions }
    }

    /// 检查转换是否合法
    pub fn can_transition(&self, from: &JourneyStage, action: &ActionKind) -> bool {
        self.transitions.contains_key(&(*from, *action))
    }

    /// 执行转换查表
    pub fn transition(&self, from: &JourneyStage, action: &ActionKind) -> Result<JourneyStage> {
        match self.transitions.get(&(*from, *action)) {
            Some(to) => Ok(*to),
            None => Err(FlowError::InvalidAction {
                stage: from.as_str().to_string(),
                action: action.as_str().to_string(),
            }),
        }
    }

    /// 获取某阶段下全部合法操作，供调用方渲染后续步骤
    pub fn available_actions(&self, stage: &JourneyStage) -> Vec<ActionKind> {
        let mut actions: Vec<ActionKind> = self
            .transitions
            .keys()
            .filter(|(from, _)| from == stage)
            .map(|(_, action)| *action)
            .collect();
        actions.sort();
        actions
    }
}

impl Default for JourneyTransitionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_actions() -> Vec<ActionKind> {
        vec![
            ActionKind::ScanTag,
            ActionKind::Register,
            ActionKind::ConfirmArrival,
            ActionKind::DeferEntry,
            ActionKind::ResumeEntry,
            ActionKind::CallPatient,
            ActionKind::StartService,
            ActionKind::CompleteExam,
            ActionKind::MarkNoShow,
            ActionKind::CancelQueue,
            ActionKind::ProceedToPayment,
            ActionKind::ConfirmPayment,
            ActionKind::StartNewVisit,
        ]
    }

    #[test]
    fn test_valid_transitions() {
        let table = JourneyTransitionTable::new();

        assert_eq!(
            table.transition(&JourneyStage::Unregistered, &ActionKind::ScanTag).unwrap(),
            JourneyStage::Arrived
        );
        assert_eq!(
            table.transition(&JourneyStage::Waiting, &ActionKind::CallPatient).unwrap(),
            JourneyStage::Called
        );
        assert_eq!(
            table.transition(&JourneyStage::Finished, &ActionKind::StartNewVisit).unwrap(),
            JourneyStage::Unregistered
        );
    }

    #[test]
    fn test_totality_over_action_alphabet() {
        let table = JourneyTransitionTable::new();

        // 每个(阶段, 操作)组合要么有定义，要么返回显式错误
        for stage in JourneyStage::all() {
            for action in all_actions() {
                match table.transition(&stage, &action) {
                    Ok(_) => assert!(table.can_transition(&stage, &action)),
                    Err(FlowError::InvalidAction { stage: s, action: a }) => {
                        assert_eq!(s, stage.as_str());
                        assert_eq!(a, action.as_str());
                    }
                    Err(other) => panic!("unexpected error: {}", other),
                }
            }
        }
    }

    #[test]
    fn test_unreachable_combinations_rejected() {
        let table = JourneyTransitionTable::new();

        assert!(table.transition(&JourneyStage::Unregistered, &ActionKind::CallPatient).is_err());
        assert!(table.transition(&JourneyStage::InService, &ActionKind::Register).is_err());
        assert!(table.transition(&JourneyStage::Finished, &ActionKind::ConfirmPayment).is_err());
    }

    #[test]
    fn test_available_actions() {
        let table = JourneyTransitionTable::new();

        let from_called = table.available_actions(&JourneyStage::Called);
        assert!(from_called.contains(&ActionKind::StartService));
        assert!(from_called.contains(&ActionKind::MarkNoShow));
        assert!(from_called.contains(&ActionKind::CancelQueue));
        assert_eq!(from_called.len(), 3);

        assert_eq!(
            table.available_actions(&JourneyStage::Unregistered),
            vec![ActionKind::ScanTag]
        );
    }
}
