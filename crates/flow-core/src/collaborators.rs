//! 外部协作方接口
//!
//! 预约、预测等协作系统对引擎只读可见，引擎把它们当作
//! 可替换的 trait 注入；附带内存实现供服务端与测试使用。

use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::RwLock;
use uuid::Uuid;

/// 预约协作方：孤儿清扫需要知道患者当天是否还有后续预约
#[async_trait]
pub trait AppointmentProvider: Send + Sync {
    async fn has_future_visit(&self, patient_id: Uuid) -> bool;
}

/// 预测协作方：提供预估等待时间，仅供展示，不参与排序
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn estimate_wait(&self, station_id: Uuid, rank: usize) -> Option<i64>;
}

/// 内存预约簿
#[derive(Debug, Default)]
pub struct StaticAppointmentBook {
    booked: RwLock<HashSet<Uuid>>,
}

impl StaticAppointmentBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn book(&self, patient_id: Uuid) {
        self.booked.write().await.insert(patient_id);
    }

    pub async fn unbook(&self, patient_id: Uuid) {
        self.booked.write().await.remove(&patient_id);
    }
}

#[async_trait]
impl AppointmentProvider for StaticAppointmentBook {
    async fn has_future_visit(&self, patient_id: Uuid) -> bool {
        self.booked.read().await.contains(&patient_id)
    }
}

/// 按名次线性估算的预测器
#[derive(Debug)]
pub struct FixedRateForecast {
    minutes_per_patient: i64,
}

impl FixedRateForecast {
    pub fn new(minutes_per_patient: i64) -> Self {
        Self { minutes_per_patient }
    }
}

#[async_trait]
impl ForecastProvider for FixedRateForecast {
    async fn estimate_wait(&self, station_id: Uuid, rank: usize) -> Option<i64> {
        let estimate = self.minutes_per_patient.checked_mul(rank as i64)?;
        tracing::debug!("estimated wait for station {} rank {}: {}min", station_id, rank, estimate);
        Some(estimate)
    }
}
