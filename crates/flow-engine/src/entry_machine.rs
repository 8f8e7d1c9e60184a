//! 排队记录状态机
//!
//! 记录级的小状态机：`Waiting ↔ Delayed → Called → InService → Completed`，
//! `Cancelled` 与 `NoShow` 可从任意非终态进入。

use flow_core::{FlowError, QueueState, Result};

/// 判断记录状态转换是否可达
pub fn can_advance(from: &QueueState, to: &QueueState) -> bool {
    if from.is_terminal() {
        return false;
    }

    // 任意非终态都可以取消或标记过号
    if matches!(to, QueueState::Cancelled | QueueState::NoShow) {
        return true;
    }

    matches!(
        (from, to),
        (QueueState::Waiting, QueueState::Delayed)
            | (QueueState::Waiting, QueueState::Called)
            | (QueueState::Delayed, QueueState::Waiting)
            | (QueueState::Delayed, QueueState::Called)
            | (QueueState::Called, QueueState::InService)
            | (QueueState::InService, QueueState::Completed)
    )
}

/// 校验并执行记录状态转换
pub fn advance(from: &QueueState, to: &QueueState) -> Result<QueueState> {
    if can_advance(from, to) {
        Ok(*to)
    } else {
        Err(FlowError::InvalidEntryTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        assert!(can_advance(&QueueState::Waiting, &QueueState::Called));
        assert!(can_advance(&QueueState::Called, &QueueState::InService));
        assert!(can_advance(&QueueState::InService, &QueueState::Completed));
    }

    #[test]
    fn test_delay_round_trip() {
        assert!(can_advance(&QueueState::Waiting, &QueueState::Delayed));
        assert!(can_advance(&QueueState::Delayed, &QueueState::Waiting));
        assert!(can_advance(&QueueState::Delayed, &QueueState::Called));
    }

    #[test]
    fn test_cancel_and_no_show_from_any_open_state() {
        for from in [
            QueueState::Waiting,
            QueueState::Delayed,
            QueueState::Called,
            QueueState::InService,
        ] {
            assert!(can_advance(&from, &QueueState::Cancelled));
            assert!(can_advance(&from, &QueueState::NoShow));
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for from in [QueueState::Completed, QueueState::Cancelled, QueueState::NoShow] {
            for to in [QueueState::Waiting, QueueState::Called, QueueState::Cancelled] {
                assert!(!can_advance(&from, &to));
            }
        }
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = advance(&QueueState::Waiting, &QueueState::InService).unwrap_err();
        assert!(matches!(err, FlowError::InvalidEntryTransition { .. }));
    }
}
