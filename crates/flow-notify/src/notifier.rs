//! 变更通知器
//!
//! 每次已提交的变更产生一条患者快照，推送到三个频道范围。
//! 推送是尽力而为的：没有订阅者或订阅者落后都不会影响
//! 产生该消息的那次状态提交。

use crate::source::SnapshotSource;
use flow_core::{FacilitySnapshot, FlowError, PatientSnapshot, Result, StationSnapshot};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_secs(2);

/// 变更通知器
pub struct ChangeNotifier {
    /// 频道按需创建后不回收，与通知器同生命周期
    patient_channels: RwLock<HashMap<Uuid, broadcast::Sender<PatientSnapshot>>>,
    station_channels: RwLock<HashMap<Uuid, broadcast::Sender<PatientSnapshot>>>,
    facility_channel: broadcast::Sender<PatientSnapshot>,
    source: Arc<dyn SnapshotSource>,
    capacity: usize,
    pull_timeout: Duration,
}

impl ChangeNotifier {
    pub fn new(source: Arc<dyn SnapshotSource>) -> Self {
        Self::with_capacity(source, DEFAULT_CHANNEL_CAPACITY)
    }

    /// 频道容量决定慢观察者最多积压多少条消息，超出即丢弃
    pub fn with_capacity(source: Arc<dyn SnapshotSource>, capacity: usize) -> Self {
        let (facility_channel, _) = broadcast::channel(capacity);
        Self {
            patient_channels: RwLock::new(HashMap::new()),
            station_channels: RwLock::new(HashMap::new()),
            facility_channel,
            source,
            capacity,
            pull_timeout: DEFAULT_PULL_TIMEOUT,
        }
    }

    /// 订阅某位患者的变更
    pub async fn subscribe_patient(&self, patient_id: Uuid) -> broadcast::Receiver<PatientSnapshot> {
        let mut channels = self.patient_channels.write().await;
        channels
            .entry(patient_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// 订阅某站点看板的变更
    pub async fn subscribe_station(&self, station_id: Uuid) -> broadcast::Receiver<PatientSnapshot> {
        let mut channels = self.station_channels.write().await;
        channels
            .entry(station_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// 订阅全院监控频道
    pub fn subscribe_facility(&self) -> broadcast::Receiver<PatientSnapshot> {
        self.facility_channel.subscribe()
    }

    /// 扇出一条已提交变更的快照
    ///
    /// 协调器在患者临界区内按提交顺序调用本方法，因此单个患者
    /// 频道上的消息顺序与提交顺序一致。站点频道的目标是快照中
    /// 未结束记录所在的站点，加上 `station_id` 标注的本次变更
    /// 作用站点；记录离队时后者是站点收到该事件的唯一途径。
    /// 投递失败只记日志。
    pub async fn publish(&self, snapshot: PatientSnapshot) {
        {
            let channels = self.patient_channels.read().await;
            if let Some(sender) = channels.get(&snapshot.patient_id) {
                if sender.send(snapshot.clone()).is_err() {
                    debug!("no live subscribers on patient channel {}", snapshot.patient_id);
                }
            }
        }

        let mut stations: HashSet<Uuid> = snapshot
            .open_queue_entries
            .iter()
            .map(|entry| entry.station_id)
            .collect();
        if let Some(station_id) = snapshot.station_id {
            stations.insert(station_id);
        }

        {
            let channels = self.station_channels.read().await;
            for station_id in stations {
                if let Some(sender) = channels.get(&station_id) {
                    if sender.send(snapshot.clone()).is_err() {
                        debug!("no live subscribers on station channel {}", station_id);
                    }
                }
            }
        }

        if self.facility_channel.send(snapshot).is_err() {
            debug!("no live subscribers on facility channel");
        }
    }

    /// 拉取某位患者的现算快照
    pub async fn pull_patient(&self, patient_id: Uuid) -> Result<PatientSnapshot> {
        self.bounded(self.source.patient_snapshot(patient_id)).await
    }

    /// 拉取某站点的现算快照，供重连的观察者重同步
    pub async fn pull_station(&self, station_id: Uuid) -> Result<StationSnapshot> {
        self.bounded(self.source.station_snapshot(station_id)).await
    }

    /// 拉取全院现算快照
    pub async fn pull_facility(&self) -> Result<FacilitySnapshot> {
        self.bounded(self.source.facility_snapshot()).await
    }

    /// 拉取有响应时限，超时的调用方应视频道停滞并重新订阅
    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.pull_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("snapshot pull timed out after {:?}", self.pull_timeout);
                Err(FlowError::NotificationDelivery(format!(
                    "快照拉取超过 {:?} 未返回",
                    self.pull_timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use flow_core::{JourneyStage, QueueEntrySummary, QueuePriority, QueueState};

    struct FixedSource {
        patient_id: Uuid,
    }

    #[async_trait]
    impl SnapshotSource for FixedSource {
        async fn patient_snapshot(&self, patient_id: Uuid) -> Result<PatientSnapshot> {
            Ok(snapshot(patient_id, None))
        }

        async fn station_snapshot(&self, station_id: Uuid) -> Result<StationSnapshot> {
            Ok(StationSnapshot {
                station_id,
                entries: vec![summary(self.patient_id, station_id)],
                timestamp: Utc::now(),
            })
        }

        async fn facility_snapshot(&self) -> Result<FacilitySnapshot> {
            Ok(FacilitySnapshot {
                stations: Vec::new(),
                timestamp: Utc::now(),
            })
        }
    }

    /// 永不返回的快照源，用于验证拉取时限
    struct StalledSource;

    #[async_trait]
    impl SnapshotSource for StalledSource {
        async fn patient_snapshot(&self, _patient_id: Uuid) -> Result<PatientSnapshot> {
            std::future::pending().await
        }

        async fn station_snapshot(&self, _station_id: Uuid) -> Result<StationSnapshot> {
            std::future::pending().await
        }

        async fn facility_snapshot(&self) -> Result<FacilitySnapshot> {
            std::future::pending().await
        }
    }

    fn summary(_patient_id: Uuid, station_id: Uuid) -> QueueEntrySummary {
        QueueEntrySummary {
            entry_id: Uuid::new_v4(),
            station_id,
            state: QueueState::Waiting,
            position: 1,
            priority: QueuePriority::Normal,
            estimated_wait_minutes: None,
        }
    }

    fn snapshot(patient_id: Uuid, station_id: Option<Uuid>) -> PatientSnapshot {
        PatientSnapshot {
            patient_id,
            station_id,
            journey_stage: JourneyStage::Waiting,
            open_queue_entries: station_id
                .map(|id| vec![summary(patient_id, id)])
                .unwrap_or_default(),
            timestamp: Utc::now(),
        }
    }

    fn notifier(patient_id: Uuid) -> ChangeNotifier {
        ChangeNotifier::new(Arc::new(FixedSource { patient_id }))
    }

    #[tokio::test]
    async fn test_publish_reaches_all_scopes() {
        let patient_id = Uuid::new_v4();
        let station_id = Uuid::new_v4();
        let notifier = notifier(patient_id);

        let mut patient_rx = notifier.subscribe_patient(patient_id).await;
        let mut station_rx = notifier.subscribe_station(station_id).await;
        let mut facility_rx = notifier.subscribe_facility();

        notifier.publish(snapshot(patient_id, Some(station_id))).await;

        assert_eq!(patient_rx.recv().await.unwrap().patient_id, patient_id);
        assert_eq!(station_rx.recv().await.unwrap().patient_id, patient_id);
        assert_eq!(facility_rx.recv().await.unwrap().patient_id, patient_id);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let patient_id = Uuid::new_v4();
        let notifier = notifier(patient_id);

        // 没有任何订阅者时发布不报错
        notifier.publish(snapshot(patient_id, Some(Uuid::new_v4()))).await;
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_instead_of_blocking() {
        let patient_id = Uuid::new_v4();
        let source = Arc::new(FixedSource { patient_id });
        let notifier = ChangeNotifier::with_capacity(source, 2);

        let mut rx = notifier.subscribe_patient(patient_id).await;
        for _ in 0..5 {
            notifier.publish(snapshot(patient_id, None)).await;
        }

        // 容量为2的频道最多保留最近两条，其余丢弃
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        assert!(rx.recv().await.is_ok());
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_pull_returns_fresh_snapshot() {
        let patient_id = Uuid::new_v4();
        let station_id = Uuid::new_v4();
        let notifier = notifier(patient_id);

        let pulled = notifier.pull_station(station_id).await.unwrap();
        assert_eq!(pulled.station_id, station_id);
        assert_eq!(pulled.entries.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_times_out_on_stalled_source() {
        let notifier = ChangeNotifier::new(Arc::new(StalledSource));
        let result = notifier.pull_facility().await;
        assert!(matches!(result, Err(FlowError::NotificationDelivery(_))));
    }
}
