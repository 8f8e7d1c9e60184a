//! 排队台账
//!
//! 各站点候诊队列的有序记录集合，是系统中唯一被多类操作者
//! 并发修改的实体。取号序号在台账写锁内分配，同一站点的两次
//! 并发加入不可能拿到相同序号；同一(患者, 站点)至多存在一条
//! 未结束记录，该不变量在加入时强制检查。

use crate::entry_machine;
use chrono::Utc;
use flow_core::{FlowError, QueueEntry, QueuePriority, QueueState, Result};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Default)]
struct LedgerState {
    entries: HashMap<Uuid, QueueEntry>,
    /// (patient_id, station_id) -> 未结束记录，至多一条
    open_index: HashMap<(Uuid, Uuid), Uuid>,
    /// 站点内单调递增的取号计数器
    next_position: HashMap<Uuid, i64>,
}

impl LedgerState {
    fn insert_new(&mut self, patient_id: Uuid, station_id: Uuid, priority: QueuePriority) -> QueueEntry {
        let counter = self.next_position.entry(station_id).or_insert(0);
        *counter += 1;

        let entry = QueueEntry {
            id: Uuid::new_v4(),
            patient_id,
            station_id,
            state: QueueState::Waiting,
            position: *counter,
            priority,
            estimated_wait_minutes: None,
            cancel_reason: None,
            created_at: Utc::now(),
            called_at: None,
        };

        self.open_index.insert((patient_id, station_id), entry.id);
        self.entries.insert(entry.id, entry.clone());
        entry
    }

    fn open_entry(&self, patient_id: Uuid, station_id: Uuid) -> Option<&QueueEntry> {
        self.open_index
            .get(&(patient_id, station_id))
            .and_then(|id| self.entries.get(id))
    }
}

/// 站点内展示排序：已叫号/服务中的记录始终领先（按叫号时间），
/// 候诊记录按优先级（紧急在前）再按取号序号。优先级不会把紧急
/// 记录插到已过候诊阶段的记录之前。
pub fn display_order(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    fn category(entry: &QueueEntry) -> u8 {
        match entry.state {
            QueueState::InService | QueueState::Called => 0,
            _ => 1,
        }
    }

    let (ca, cb) = (category(a), category(b));
    ca.cmp(&cb).then_with(|| {
        if ca == 0 {
            a.called_at.cmp(&b.called_at).then(a.position.cmp(&b.position))
        } else {
            a.priority.cmp(&b.priority).then(a.position.cmp(&b.position))
        }
    })
}

/// 排队台账
#[derive(Debug, Default)]
pub struct QueueLedger {
    inner: RwLock<LedgerState>,
}

impl QueueLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入站点候诊队列
    ///
    /// 已存在未结束记录时返回 `DuplicateOpenEntry`（携带既有记录
    /// 的标识，调用方可据此按幂等成功处理），不消耗新序号。
    pub async fn join(
        &self,
        patient_id: Uuid,
        station_id: Uuid,
        priority: QueuePriority,
    ) -> Result<QueueEntry> {
        let mut state = self.inner.write().await;

        if let Some(existing) = state.open_entry(patient_id, station_id) {
            return Err(FlowError::DuplicateOpenEntry {
                patient_id,
                station_id,
                existing_entry_id: existing.id,
            });
        }

        let entry = state.insert_new(patient_id, station_id, priority);
        info!(
            "patient {} joined station {} at position {}",
            patient_id, station_id, entry.position
        );
        Ok(entry)
    }

    /// 幂等加入：重复提交返回既有记录，返回值标记是否新建
    pub async fn join_or_existing(
        &self,
        patient_id: Uuid,
        station_id: Uuid,
        priority: QueuePriority,
    ) -> Result<(QueueEntry, bool)> {
        let mut state = self.inner.write().await;

        if let Some(existing) = state.open_entry(patient_id, station_id) {
            debug!(
                "duplicate join for patient {} at station {} treated as idempotent success",
                patient_id, station_id
            );
            return Ok((existing.clone(), false));
        }

        let entry = state.insert_new(patient_id, station_id, priority);
        info!(
            "patient {} joined station {} at position {}",
            patient_id, station_id, entry.position
        );
        Ok((entry, true))
    }

    /// 推进记录状态，进入叫号态时记录叫号时间
    pub async fn advance(&self, entry_id: Uuid, new_state: QueueState) -> Result<QueueEntry> {
        let mut state = self.inner.write().await;
        let entry = state
            .entries
            .get_mut(&entry_id)
            .ok_or_else(|| FlowError::NotFound(format!("排队记录 {} 不存在", entry_id)))?;

        let old_state = entry.state;
        entry.state = entry_machine::advance(&old_state, &new_state)?;
        if new_state == QueueState::Called {
            entry.called_at = Some(Utc::now());
        }

        let snapshot = entry.clone();
        if snapshot.state.is_terminal() {
            state.open_index.remove(&(snapshot.patient_id, snapshot.station_id));
        }

        info!(
            "queue entry {} advanced from {} to {}",
            entry_id, old_state, snapshot.state
        );
        Ok(snapshot)
    }

    /// 取消记录并释放位置；后续记录不重排，序号只是取号凭证
    pub async fn cancel(&self, entry_id: Uuid, reason: impl Into<String>) -> Result<QueueEntry> {
        let reason = reason.into();
        let mut state = self.inner.write().await;
        let entry = state
            .entries
            .get_mut(&entry_id)
            .ok_or_else(|| FlowError::NotFound(format!("排队记录 {} 不存在", entry_id)))?;

        entry.state = entry_machine::advance(&entry.state, &QueueState::Cancelled)?;
        entry.cancel_reason = Some(reason);

        let snapshot = entry.clone();
        state.open_index.remove(&(snapshot.patient_id, snapshot.station_id));

        info!("queue entry {} cancelled", entry_id);
        Ok(snapshot)
    }

    /// 实时名次：同站点排在该记录之前的未结束记录数，读取时计算
    pub async fn position_of(&self, entry_id: Uuid) -> Result<usize> {
        let state = self.inner.read().await;
        let target = state
            .entries
            .get(&entry_id)
            .ok_or_else(|| FlowError::NotFound(format!("排队记录 {} 不存在", entry_id)))?;

        if target.state.is_terminal() {
            return Err(FlowError::Validation(format!(
                "排队记录 {} 已结束，不再有名次",
                entry_id
            )));
        }

        let ahead = state
            .entries
            .values()
            .filter(|entry| {
                entry.station_id == target.station_id
                    && entry.state.is_open()
                    && entry.id != target.id
                    && display_order(entry, target) == Ordering::Less
            })
            .count();
        Ok(ahead)
    }

    pub async fn entry(&self, entry_id: Uuid) -> Option<QueueEntry> {
        self.inner.read().await.entries.get(&entry_id).cloned()
    }

    pub async fn open_entry(&self, patient_id: Uuid, station_id: Uuid) -> Option<QueueEntry> {
        self.inner
            .read()
            .await
            .open_entry(patient_id, station_id)
            .cloned()
    }

    pub async fn open_entries_for_patient(&self, patient_id: Uuid) -> Vec<QueueEntry> {
        let state = self.inner.read().await;
        let mut entries: Vec<QueueEntry> = state
            .entries
            .values()
            .filter(|entry| entry.patient_id == patient_id && entry.state.is_open())
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        entries
    }

    /// 站点当前候诊队列，按展示排序策略排列
    pub async fn open_entries_for_station(&self, station_id: Uuid) -> Vec<QueueEntry> {
        let state = self.inner.read().await;
        let mut entries: Vec<QueueEntry> = state
            .entries
            .values()
            .filter(|entry| entry.station_id == station_id && entry.state.is_open())
            .cloned()
            .collect();
        entries.sort_by(display_order);
        entries
    }

    /// 全部未结束记录，供映射一致性清扫使用
    pub async fn open_entries(&self) -> Vec<QueueEntry> {
        self.inner
            .read()
            .await
            .entries
            .values()
            .filter(|entry| entry.state.is_open())
            .cloned()
            .collect()
    }

    /// 写入预测协作方给出的预估等待，仅供展示
    pub async fn set_estimated_wait(&self, entry_id: Uuid, minutes: i64) -> Result<()> {
        let mut state = self.inner.write().await;
        let entry = state
            .entries
            .get_mut(&entry_id)
            .ok_or_else(|| FlowError::NotFound(format!("排队记录 {} 不存在", entry_id)))?;
        entry.estimated_wait_minutes = Some(minutes);
        Ok(())
    }

    /// 出现过排队记录的站点集合
    pub async fn station_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.inner.read().await.next_position.keys().copied().collect();
        ids.sort();
        ids
    }
}
