//! 审计报告结构

use chrono::{DateTime, Utc};
use flow_core::JourneyStage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 遗留标签发现项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyLabelFinding {
    pub patient_id: Uuid,
    pub stored_label: String,
    pub canonical_label: String,
    pub repaired: bool,
}

/// 映射不一致发现项：台账是活动服务状态的事实来源
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingMismatch {
    pub patient_id: Uuid,
    pub stored_stage: Option<JourneyStage>,
    pub implied_stage: JourneyStage,
    pub open_entry_count: usize,
    pub repaired: bool,
}

/// 孤儿发现项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanFinding {
    pub patient_id: Uuid,
    pub stored_stage: JourneyStage,
    pub repaired: bool,
}

/// 审计报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub legacy_labels_found: Vec<LegacyLabelFinding>,
    pub mapping_mismatches: Vec<MappingMismatch>,
    pub orphans: Vec<OrphanFinding>,
    /// 本次运行是否启用了修复模式
    pub repaired: bool,
    pub generated_at: DateTime<Utc>,
}

impl AuditReport {
    pub fn new(repaired: bool) -> Self {
        Self {
            legacy_labels_found: Vec::new(),
            mapping_mismatches: Vec::new(),
            orphans: Vec::new(),
            repaired,
            generated_at: Utc::now(),
        }
    }

    /// 是否没有任何发现项
    pub fn is_clean(&self) -> bool {
        self.legacy_labels_found.is_empty()
            && self.mapping_mismatches.is_empty()
            && self.orphans.is_empty()
    }

    pub fn total_findings(&self) -> usize {
        self.legacy_labels_found.len() + self.mapping_mismatches.len() + self.orphans.len()
    }
}
