//! 流转日志
//!
//! 不可变的状态流转记录，只追加，永不更新或删除。
//! 单个患者的条目按提交顺序全序排列，供审计与一致性清扫推理。

use flow_core::TransitionLogEntry;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// 流转日志
#[derive(Debug, Default)]
pub struct TransitionLog {
    entries: RwLock<Vec<TransitionLogEntry>>,
    by_patient: RwLock<HashMap<Uuid, Vec<usize>>>,
}

impl TransitionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, entry: TransitionLogEntry) {
        let mut entries = self.entries.write().await;
        let mut by_patient = self.by_patient.write().await;
        by_patient
            .entry(entry.patient_id)
            .or_default()
            .push(entries.len());
        entries.push(entry);
    }

    /// 某患者的全部流转条目，按提交顺序
    pub async fn for_patient(&self, patient_id: Uuid) -> Vec<TransitionLogEntry> {
        let entries = self.entries.read().await;
        let by_patient = self.by_patient.read().await;
        by_patient
            .get(&patient_id)
            .map(|indexes| indexes.iter().map(|&i| entries[i].clone()).collect())
            .unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::{ActorClass, JourneyStage};

    #[tokio::test]
    async fn test_append_preserves_per_patient_order() {
        let log = TransitionLog::new();
        let patient = Uuid::new_v4();
        let other = Uuid::new_v4();

        log.append(TransitionLogEntry::new(
            patient,
            JourneyStage::Unregistered,
            JourneyStage::Arrived,
            "scan_tag",
            ActorClass::Patient,
            None,
        ))
        .await;
        log.append(TransitionLogEntry::new(
            other,
            JourneyStage::Unregistered,
            JourneyStage::Arrived,
            "scan_tag",
            ActorClass::Patient,
            None,
        ))
        .await;
        log.append(TransitionLogEntry::new(
            patient,
            JourneyStage::Arrived,
            JourneyStage::Registered,
            "register",
            ActorClass::Patient,
            None,
        ))
        .await;

        let timeline = log.for_patient(patient).await;
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].to_stage, JourneyStage::Arrived);
        assert_eq!(timeline[1].to_stage, JourneyStage::Registered);
        assert_eq!(log.len().await, 3);
    }
}
