//! 快照来源接口
//!
//! 拉取式重同步必须返回现算的快照而不是上一条推送的回放，
//! 因此通知器通过该接口向引擎索取最新状态。

use async_trait::async_trait;
use flow_core::{FacilitySnapshot, PatientSnapshot, Result, StationSnapshot};
use uuid::Uuid;

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn patient_snapshot(&self, patient_id: Uuid) -> Result<PatientSnapshot>;

    async fn station_snapshot(&self, station_id: Uuid) -> Result<StationSnapshot>;

    async fn facility_snapshot(&self) -> Result<FacilitySnapshot>;
}
