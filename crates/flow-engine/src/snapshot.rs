//! 快照构建
//!
//! 从排队台账与阶段存档现算观察者可见的快照。
//! 每次调用都重新计算实时名次，不缓存跨写入的结果。

use crate::queue_ledger::QueueLedger;
use crate::stage_store::StageStore;
use async_trait::async_trait;
use chrono::Utc;
use flow_core::{
    FacilitySnapshot, FlowError, PatientSnapshot, QueueEntry, QueueEntrySummary, Result,
    StationSnapshot,
};
use flow_notify::SnapshotSource;
use std::sync::Arc;
use uuid::Uuid;

/// 快照构建器
pub struct SnapshotBuilder {
    ledger: Arc<QueueLedger>,
    stages: Arc<StageStore>,
}

impl SnapshotBuilder {
    pub fn new(ledger: Arc<QueueLedger>, stages: Arc<StageStore>) -> Self {
        Self { ledger, stages }
    }

    async fn summarize(&self, entry: &QueueEntry) -> QueueEntrySummary {
        // 实时名次，1 起始，读取时刻计算
        let rank = self.ledger.position_of(entry.id).await.unwrap_or(0);
        QueueEntrySummary {
            entry_id: entry.id,
            station_id: entry.station_id,
            state: entry.state,
            position: rank + 1,
            priority: entry.priority,
            estimated_wait_minutes: entry.estimated_wait_minutes,
        }
    }

    pub async fn patient(&self, patient_id: Uuid) -> Result<PatientSnapshot> {
        let journey_stage = self
            .stages
            .get(patient_id)
            .await
            .ok_or(FlowError::NoState(patient_id))?;

        let mut open_queue_entries = Vec::new();
        for entry in self.ledger.open_entries_for_patient(patient_id).await {
            open_queue_entries.push(self.summarize(&entry).await);
        }

        Ok(PatientSnapshot {
            patient_id,
            station_id: None,
            journey_stage,
            open_queue_entries,
            timestamp: Utc::now(),
        })
    }

    pub async fn station(&self, station_id: Uuid) -> Result<StationSnapshot> {
        let mut entries = Vec::new();
        for entry in self.ledger.open_entries_for_station(station_id).await {
            entries.push(self.summarize(&entry).await);
        }

        Ok(StationSnapshot {
            station_id,
            entries,
            timestamp: Utc::now(),
        })
    }

    pub async fn facility(&self) -> Result<FacilitySnapshot> {
        let mut stations = Vec::new();
        for station_id in self.ledger.station_ids().await {
            stations.push(self.station(station_id).await?);
        }

        Ok(FacilitySnapshot {
            stations,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl SnapshotSource for SnapshotBuilder {
    async fn patient_snapshot(&self, patient_id: Uuid) -> Result<PatientSnapshot> {
        self.patient(patient_id).await
    }

    async fn station_snapshot(&self, station_id: Uuid) -> Result<StationSnapshot> {
        self.station(station_id).await
    }

    async fn facility_snapshot(&self) -> Result<FacilitySnapshot> {
        self.facility().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::{JourneyStage, QueuePriority};

    #[tokio::test]
    async fn test_patient_snapshot_reflects_live_rank() {
        let ledger = Arc::new(QueueLedger::new());
        let stages = Arc::new(StageStore::new());
        let builder = SnapshotBuilder::new(ledger.clone(), stages.clone());

        let station = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        stages.init(first).await;
        stages.init(second).await;
        stages.set(first, JourneyStage::Waiting).await.unwrap();
        stages.set(second, JourneyStage::Waiting).await.unwrap();

        let head = ledger.join(first, station, QueuePriority::Normal).await.unwrap();
        ledger.join(second, station, QueuePriority::Normal).await.unwrap();

        let snapshot = builder.patient(second).await.unwrap();
        assert_eq!(snapshot.journey_stage, JourneyStage::Waiting);
        assert_eq!(snapshot.open_queue_entries.len(), 1);
        assert_eq!(snapshot.open_queue_entries[0].position, 2);

        // 队头取消后，名次在下一次快照中即时前移
        ledger.cancel(head.id, "离开").await.unwrap();
        let snapshot = builder.patient(second).await.unwrap();
        assert_eq!(snapshot.open_queue_entries[0].position, 1);
    }

    #[tokio::test]
    async fn test_snapshot_requires_initialized_patient() {
        let builder = SnapshotBuilder::new(Arc::new(QueueLedger::new()), Arc::new(StageStore::new()));
        assert!(matches!(
            builder.patient(Uuid::new_v4()).await,
            Err(FlowError::NoState(_))
        ));
    }

    #[tokio::test]
    async fn test_facility_snapshot_covers_all_stations() {
        let ledger = Arc::new(QueueLedger::new());
        let stages = Arc::new(StageStore::new());
        let builder = SnapshotBuilder::new(ledger.clone(), stages);

        let station_a = Uuid::new_v4();
        let station_b = Uuid::new_v4();
        ledger.join(Uuid::new_v4(), station_a, QueuePriority::Normal).await.unwrap();
        ledger.join(Uuid::new_v4(), station_b, QueuePriority::Normal).await.unwrap();

        let snapshot = builder.facility().await.unwrap();
        assert_eq!(snapshot.stations.len(), 2);
    }
}
