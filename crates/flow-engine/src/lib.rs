//! # Flow Engine
//!
//! 患者流转引擎，提供完整的就诊旅程与排队管理功能，包括：
//! - 旅程转换表：每个阶段下哪些操作合法、产生什么阶段的唯一事实来源
//! - 排队台账：各站点候诊队列的取号、叫号、取消与实时名次
//! - 流转协调器：校验、落账、写阶段、记日志、发通知的原子执行单元
//! - 阶段存档与只追加的流转日志

pub mod engine;
pub mod entry_machine;
pub mod orchestrator;
pub mod queue_ledger;
pub mod snapshot;
pub mod stage_store;
pub mod transition_log;
pub mod transition_table;

pub use engine::FlowEngine;
pub use orchestrator::FlowOrchestrator;
pub use queue_ledger::QueueLedger;
pub use snapshot::SnapshotBuilder;
pub use stage_store::{StageRecord, StageStore};
pub use transition_log::TransitionLog;
pub use transition_table::JourneyTransitionTable;
