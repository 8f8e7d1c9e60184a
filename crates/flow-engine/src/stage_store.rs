//! 旅程阶段存档
//!
//! 每位患者唯一的当前阶段记录。仅流转协调器持有写入路径，
//! 其余模块一律只读。记录同时保留落库时的原始标签：引擎自身
//! 写入的永远是规范标签，从旧系统导入的记录可能带同义词，
//! 留给一致性审计的遗留标签清扫处理。

use chrono::{DateTime, Utc};
use flow_core::{FlowError, JourneyStage, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// 阶段记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub patient_id: Uuid,
    pub stage: JourneyStage,
    /// 落库时的原始标签，可能是遗留同义词
    pub stored_label: String,
    pub updated_at: DateTime<Utc>,
}

/// 旅程阶段存档
#[derive(Debug, Default)]
pub struct StageStore {
    records: RwLock<HashMap<Uuid, StageRecord>>,
}

impl StageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 初始化患者记录为未登记；重复初始化返回既有阶段
    pub async fn init(&self, patient_id: Uuid) -> JourneyStage {
        let mut records = self.records.write().await;
        records
            .entry(patient_id)
            .or_insert_with(|| {
                info!("initialized journey record for patient {}", patient_id);
                StageRecord {
                    patient_id,
                    stage: JourneyStage::Unregistered,
                    stored_label: JourneyStage::Unregistered.as_str().to_string(),
                    updated_at: Utc::now(),
                }
            })
            .stage
    }

    pub async fn get(&self, patient_id: Uuid) -> Option<JourneyStage> {
        self.records.read().await.get(&patient_id).map(|record| record.stage)
    }

    /// 写入新阶段，总是落规范标签
    pub async fn set(&self, patient_id: Uuid, stage: JourneyStage) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&patient_id)
            .ok_or(FlowError::NoState(patient_id))?;
        record.stage = stage;
        record.stored_label = stage.as_str().to_string();
        record.updated_at = Utc::now();
        Ok(())
    }

    /// 从外部系统导入一条记录，标签在读取边界归一化后保留原文
    pub async fn import_label(&self, patient_id: Uuid, raw_label: &str) -> Result<JourneyStage> {
        let stage = JourneyStage::parse_label(raw_label)?;
        let mut records = self.records.write().await;
        records.insert(
            patient_id,
            StageRecord {
                patient_id,
                stage,
                stored_label: raw_label.to_string(),
                updated_at: Utc::now(),
            },
        );
        Ok(stage)
    }

    pub async fn records(&self) -> Vec<StageRecord> {
        self.records.read().await.values().cloned().collect()
    }

    /// 标签不是规范形式的记录
    pub async fn legacy_label_records(&self) -> Vec<StageRecord> {
        self.records
            .read()
            .await
            .values()
            .filter(|record| !JourneyStage::is_canonical_label(&record.stored_label))
            .cloned()
            .collect()
    }

    /// 把记录的存储标签改写为规范形式，阶段语义不变
    pub async fn rewrite_label(&self, patient_id: Uuid) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&patient_id)
            .ok_or(FlowError::NoState(patient_id))?;
        let canonical = record.stage.as_str();
        if record.stored_label != canonical {
            info!(
                "rewrote legacy label '{}' to '{}' for patient {}",
                record.stored_label, canonical, patient_id
            );
            record.stored_label = canonical.to_string();
            record.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let store = StageStore::new();
        let patient = Uuid::new_v4();

        assert_eq!(store.init(patient).await, JourneyStage::Unregistered);
        store.set(patient, JourneyStage::Arrived).await.unwrap();

        // 再次初始化不会覆盖已有阶段
        assert_eq!(store.init(patient).await, JourneyStage::Arrived);
    }

    #[tokio::test]
    async fn test_set_requires_initialization() {
        let store = StageStore::new();
        let err = store.set(Uuid::new_v4(), JourneyStage::Waiting).await.unwrap_err();
        assert!(matches!(err, FlowError::NoState(_)));
    }

    #[tokio::test]
    async fn test_imported_legacy_label_is_normalized_but_kept() {
        let store = StageStore::new();
        let patient = Uuid::new_v4();

        let stage = store.import_label(patient, "ongoing").await.unwrap();
        assert_eq!(stage, JourneyStage::InService);
        assert_eq!(store.get(patient).await, Some(JourneyStage::InService));

        let legacy = store.legacy_label_records().await;
        assert_eq!(legacy.len(), 1);
        assert_eq!(legacy[0].stored_label, "ongoing");

        store.rewrite_label(patient).await.unwrap();
        assert!(store.legacy_label_records().await.is_empty());
        assert_eq!(store.get(patient).await, Some(JourneyStage::InService));
    }

    #[tokio::test]
    async fn test_unknown_label_rejected_at_boundary() {
        let store = StageStore::new();
        assert!(store.import_label(Uuid::new_v4(), "limbo").await.is_err());
    }
}
