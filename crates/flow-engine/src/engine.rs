//! 流转引擎装配
//!
//! 把台账、阶段存档、流转日志、快照源和通知器接线为一个整体，
//! 对外暴露协调器与各组件的共享句柄。

use crate::orchestrator::FlowOrchestrator;
use crate::queue_ledger::QueueLedger;
use crate::snapshot::SnapshotBuilder;
use crate::stage_store::StageStore;
use crate::transition_log::TransitionLog;
use flow_core::collaborators::ForecastProvider;
use flow_notify::ChangeNotifier;
use std::sync::Arc;

/// 流转引擎
pub struct FlowEngine {
    ledger: Arc<QueueLedger>,
    stages: Arc<StageStore>,
    log: Arc<TransitionLog>,
    notifier: Arc<ChangeNotifier>,
    orchestrator: Arc<FlowOrchestrator>,
}

impl FlowEngine {
    /// 创建新的流转引擎
    pub fn new(forecast: Option<Arc<dyn ForecastProvider>>, channel_capacity: usize) -> Self {
        let ledger = Arc::new(QueueLedger::new());
        let stages = Arc::new(StageStore::new());
        let log = Arc::new(TransitionLog::new());

        let source = Arc::new(SnapshotBuilder::new(ledger.clone(), stages.clone()));
        let notifier = Arc::new(ChangeNotifier::with_capacity(source, channel_capacity));

        let orchestrator = Arc::new(FlowOrchestrator::new(
            ledger.clone(),
            stages.clone(),
            log.clone(),
            notifier.clone(),
            forecast,
        ));

        Self {
            ledger,
            stages,
            log,
            notifier,
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> Arc<FlowOrchestrator> {
        self.orchestrator.clone()
    }

    pub fn ledger(&self) -> Arc<QueueLedger> {
        self.ledger.clone()
    }

    pub fn stages(&self) -> Arc<StageStore> {
        self.stages.clone()
    }

    pub fn transition_log(&self) -> Arc<TransitionLog> {
        self.log.clone()
    }

    pub fn notifier(&self) -> Arc<ChangeNotifier> {
        self.notifier.clone()
    }
}

impl Default for FlowEngine {
    fn default() -> Self {
        Self::new(None, 64)
    }
}
