//! 流转协调器
//!
//! 接收(操作者, 操作, 载荷)请求，对照转换表校验，落排队台账，
//! 写阶段存档，追加流转日志，最后把新快照交给变更通知器。
//! 同一患者的操作在患者级互斥锁内串行执行；不同患者完全并行。
//! 阶段写入只存在于本模块，其他路径一律只读。

use crate::queue_ledger::QueueLedger;
use crate::snapshot::SnapshotBuilder;
use crate::stage_store::StageStore;
use crate::transition_log::TransitionLog;
use crate::transition_table::JourneyTransitionTable;
use flow_core::collaborators::ForecastProvider;
use flow_core::{
    derive_stage_from_entries, ActionKind, ActionOutcome, ActionRequest, ActorClass, FlowAction,
    FlowError, JourneyStage, QueueState, Result, TransitionLogEntry,
};
use flow_notify::ChangeNotifier;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 流转协调器
pub struct FlowOrchestrator {
    table: JourneyTransitionTable,
    ledger: Arc<QueueLedger>,
    stages: Arc<StageStore>,
    log: Arc<TransitionLog>,
    notifier: Arc<ChangeNotifier>,
    snapshots: SnapshotBuilder,
    forecast: Option<Arc<dyn ForecastProvider>>,
    /// 患者级互斥锁映射，只增不删，与内存实例同生命周期
    patient_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl FlowOrchestrator {
    pub fn new(
        ledger: Arc<QueueLedger>,
        stages: Arc<StageStore>,
        log: Arc<TransitionLog>,
        notifier: Arc<ChangeNotifier>,
        forecast: Option<Arc<dyn ForecastProvider>>,
    ) -> Self {
        let snapshots = SnapshotBuilder::new(ledger.clone(), stages.clone());
        Self {
            table: JourneyTransitionTable::new(),
            ledger,
            stages,
            log,
            notifier,
            snapshots,
            forecast,
            patient_locks: Mutex::new(HashMap::new()),
        }
    }

    /// 首次接触时初始化患者旅程记录
    pub async fn init_patient(&self, patient_id: Uuid) -> ActionOutcome {
        let stage = self.stages.init(patient_id).await;
        ActionOutcome {
            journey_stage: stage,
            available_actions: self.table.available_actions(&stage),
        }
    }

    pub async fn current_stage(&self, patient_id: Uuid) -> Result<JourneyStage> {
        self.stages
            .get(patient_id)
            .await
            .ok_or(FlowError::NoState(patient_id))
    }

    /// 当前阶段下的合法操作
    pub async fn available_actions(&self, patient_id: Uuid) -> Result<Vec<ActionKind>> {
        let stage = self.current_stage(patient_id).await?;
        Ok(self.table.available_actions(&stage))
    }

    /// 执行一次流转操作
    ///
    /// 校验、落账、写阶段、记日志在患者临界区内作为一个逻辑
    /// 原子单元完成；通知在提交之后尽力发出，其失败不回卷提交。
    pub async fn perform_action(&self, request: ActionRequest) -> Result<ActionOutcome> {
        let lock = self.patient_lock(request.patient_id).await;
        let _guard = lock.lock().await;

        let current = self.current_stage(request.patient_id).await?;
        let kind = request.action.kind();

        if !kind.allowed_for(&request.actor_class) {
            return Err(FlowError::Permission(format!(
                "角色 {:?} 不允许提交操作 {}",
                request.actor_class,
                kind.as_str()
            )));
        }

        let target = self.table.transition(&current, &kind)?;
        let touched_station = self.apply_ledger_mutation(&request).await?;

        // 台账是活动服务状态的事实来源：只要还有未结束的排队
        // 记录，阶段就由其中最高优先级的一条推导
        let new_stage = if touched_station.is_some() {
            let open = self.ledger.open_entries_for_patient(request.patient_id).await;
            derive_stage_from_entries(&open).unwrap_or(target)
        } else {
            target
        };

        self.stages.set(request.patient_id, new_stage).await?;
        self.log
            .append(TransitionLogEntry::new(
                request.patient_id,
                current,
                new_stage,
                kind.as_str(),
                request.actor_class,
                None,
            ))
            .await;

        info!(
            "patient {} moved from {} to {} via {}",
            request.patient_id, current, new_stage, kind.as_str()
        );

        self.notify(request.patient_id, touched_station).await;

        Ok(ActionOutcome {
            journey_stage: new_stage,
            available_actions: self.table.available_actions(&new_stage),
        })
    }

    /// 一致性审计的修复写入口
    ///
    /// 审计不得绕过协调器直接写阶段，修复同样走患者临界区、
    /// 追加日志并发出通知。存档缺失记录时先补建再写入，
    /// 有排队台账却无阶段记录的患者才修复得动。
    pub async fn apply_repair(
        &self,
        patient_id: Uuid,
        to_stage: JourneyStage,
        note: &str,
    ) -> Result<()> {
        let lock = self.patient_lock(patient_id).await;
        let _guard = lock.lock().await;

        let current = self.stages.init(patient_id).await;
        if current == to_stage {
            return Ok(());
        }

        self.stages.set(patient_id, to_stage).await?;
        self.log
            .append(TransitionLogEntry::new(
                patient_id,
                current,
                to_stage,
                "audit_repair",
                ActorClass::System,
                Some(note.to_string()),
            ))
            .await;

        warn!(
            "audit repair moved patient {} from {} to {}: {}",
            patient_id, current, to_stage, note
        );

        self.notify(patient_id, None).await;
        Ok(())
    }

    /// 操作隐含的台账变更；返回本次操作作用的站点
    ///
    /// 即使台账变更把记录推入终态（该站点不再有此患者的未结束
    /// 记录），返回的站点仍保证离队事件能扇出到站点频道。
    async fn apply_ledger_mutation(&self, request: &ActionRequest) -> Result<Option<Uuid>> {
        let patient_id = request.patient_id;
        match &request.action {
            FlowAction::ScanTag { .. }
            | FlowAction::Register
            | FlowAction::ProceedToPayment
            | FlowAction::ConfirmPayment
            | FlowAction::StartNewVisit => Ok(None),

            FlowAction::ConfirmArrival { station_id, priority } => {
                let (entry, created) = self
                    .ledger
                    .join_or_existing(patient_id, *station_id, *priority)
                    .await?;
                if created {
                    self.refresh_estimate(entry.id, *station_id).await;
                } else {
                    debug!(
                        "patient {} already queued at station {}, returning entry {}",
                        patient_id, station_id, entry.id
                    );
                }
                Ok(Some(*station_id))
            }

            FlowAction::DeferEntry { station_id } => {
                let entry = self.open_entry(patient_id, *station_id).await?;
                self.ledger.advance(entry.id, QueueState::Delayed).await?;
                Ok(Some(*station_id))
            }
            FlowAction::ResumeEntry { station_id } => {
                let entry = self.open_entry(patient_id, *station_id).await?;
                self.ledger.advance(entry.id, QueueState::Waiting).await?;
                Ok(Some(*station_id))
            }
            FlowAction::CallPatient { station_id } => {
                let entry = self.open_entry(patient_id, *station_id).await?;
                self.ledger.advance(entry.id, QueueState::Called).await?;
                Ok(Some(*station_id))
            }
            FlowAction::StartService { station_id } => {
                let entry = self.open_entry(patient_id, *station_id).await?;
                self.ledger.advance(entry.id, QueueState::InService).await?;
                Ok(Some(*station_id))
            }
            FlowAction::CompleteExam { station_id } => {
                let entry = self.open_entry(patient_id, *station_id).await?;
                self.ledger.advance(entry.id, QueueState::Completed).await?;
                Ok(Some(*station_id))
            }
            FlowAction::MarkNoShow { station_id } => {
                let entry = self.open_entry(patient_id, *station_id).await?;
                self.ledger.advance(entry.id, QueueState::NoShow).await?;
                Ok(Some(*station_id))
            }
            FlowAction::CancelQueue { station_id, reason } => {
                let entry = self.open_entry(patient_id, *station_id).await?;
                self.ledger.cancel(entry.id, reason.clone()).await?;
                Ok(Some(*station_id))
            }
        }
    }

    async fn open_entry(&self, patient_id: Uuid, station_id: Uuid) -> Result<flow_core::QueueEntry> {
        self.ledger
            .open_entry(patient_id, station_id)
            .await
            .ok_or_else(|| {
                FlowError::NotFound(format!(
                    "患者 {} 在站点 {} 没有未结束的排队记录",
                    patient_id, station_id
                ))
            })
    }

    /// 向预测协作方索取预估等待；失败只降级为无预估
    async fn refresh_estimate(&self, entry_id: Uuid, station_id: Uuid) {
        let Some(forecast) = &self.forecast else {
            return;
        };
        let rank = match self.ledger.position_of(entry_id).await {
            Ok(rank) => rank,
            Err(_) => return,
        };
        if let Some(minutes) = forecast.estimate_wait(station_id, rank).await {
            if let Err(e) = self.ledger.set_estimated_wait(entry_id, minutes).await {
                debug!("failed to store wait estimate for entry {}: {}", entry_id, e);
            }
        }
    }

    /// 提交后的尽力通知，投递问题只记日志，绝不打断调用方
    ///
    /// 快照标注本次变更作用的站点，站点频道的目标由未结束记录
    /// 与该站点共同决定。
    async fn notify(&self, patient_id: Uuid, station_id: Option<Uuid>) {
        match self.snapshots.patient(patient_id).await {
            Ok(mut snapshot) => {
                snapshot.station_id = station_id;
                self.notifier.publish(snapshot).await;
            }
            Err(e) => warn!("failed to build snapshot for patient {}: {}", patient_id, e),
        }
    }

    async fn patient_lock(&self, patient_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.patient_locks.lock().await;
        locks.entry(patient_id).or_default().clone()
    }

    /// 从外部系统导入阶段记录，遗留标签在此边界归一化
    pub async fn import_stage_label(&self, patient_id: Uuid, raw_label: &str) -> Result<JourneyStage> {
        self.stages.import_label(patient_id, raw_label).await
    }

    pub fn transition_table(&self) -> &JourneyTransitionTable {
        &self.table
    }
}
