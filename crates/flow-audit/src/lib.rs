//! # Flow Audit
//!
//! 一致性审计模块，离线清扫三类历史遗留问题：
//! - 遗留标签：存储中非规范形式的阶段标签
//! - 映射不一致：阶段存档与排队台账推导结果不符
//! - 孤儿记录：处于活动阶段却既无排队记录也无后续预约的患者
//!
//! 审计只产出结构化报告，修复模式下逐项纠正；任何失败都不会
//! 打断在线流量。

pub mod auditor;
pub mod report;

pub use auditor::ConsistencyAuditor;
pub use report::{AuditReport, LegacyLabelFinding, MappingMismatch, OrphanFinding};
