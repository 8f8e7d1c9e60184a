//! 一致性审计器
//!
//! 按需或定时运行，独立于在线操作路径。修复不绕过流转协调器：
//! 所有阶段写入都经由协调器的修复入口，逐项生效，单项失败只
//! 标记该发现项，清扫继续。

use crate::report::{AuditReport, LegacyLabelFinding, MappingMismatch, OrphanFinding};
use flow_core::collaborators::AppointmentProvider;
use flow_core::{derive_stage_from_entries, JourneyStage, QueueEntry};
use flow_engine::{FlowOrchestrator, QueueLedger, StageStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// 一致性审计器
pub struct ConsistencyAuditor {
    orchestrator: Arc<FlowOrchestrator>,
    ledger: Arc<QueueLedger>,
    stages: Arc<StageStore>,
    appointments: Arc<dyn AppointmentProvider>,
}

impl ConsistencyAuditor {
    pub fn new(
        orchestrator: Arc<FlowOrchestrator>,
        ledger: Arc<QueueLedger>,
        stages: Arc<StageStore>,
        appointments: Arc<dyn AppointmentProvider>,
    ) -> Self {
        Self {
            orchestrator,
            ledger,
            stages,
            appointments,
        }
    }

    /// 执行一次完整清扫
    ///
    /// 永不抛错：发现项以数据形式返回，修复失败记日志后继续。
    pub async fn run(&self, repair: bool) -> AuditReport {
        let mut report = AuditReport::new(repair);

        self.sweep_legacy_labels(&mut report, repair).await;
        self.sweep_mapping_consistency(&mut report, repair).await;
        self.sweep_orphans(&mut report, repair).await;

        info!(
            "audit sweep finished: {} findings (repair={})",
            report.total_findings(),
            repair
        );
        report
    }

    /// 遗留标签清扫：把非规范标签改写为规范形式
    async fn sweep_legacy_labels(&self, report: &mut AuditReport, repair: bool) {
        for record in self.stages.legacy_label_records().await {
            let mut finding = LegacyLabelFinding {
                patient_id: record.patient_id,
                stored_label: record.stored_label.clone(),
                canonical_label: record.stage.as_str().to_string(),
                repaired: false,
            };

            if repair {
                match self.stages.rewrite_label(record.patient_id).await {
                    Ok(()) => finding.repaired = true,
                    Err(e) => error!(
                        "failed to rewrite legacy label for patient {}: {}",
                        record.patient_id, e
                    ),
                }
            }

            report.legacy_labels_found.push(finding);
        }
    }

    /// 映射一致性清扫
    ///
    /// 对每个持有未结束排队记录的患者，用台账推导应有的旅程
    /// 阶段并与存档比对；修复方向永远是以台账纠正存档。
    async fn sweep_mapping_consistency(&self, report: &mut AuditReport, repair: bool) {
        let mut by_patient: HashMap<Uuid, Vec<QueueEntry>> = HashMap::new();
        for entry in self.ledger.open_entries().await {
            by_patient.entry(entry.patient_id).or_default().push(entry);
        }

        for (patient_id, entries) in by_patient {
            let Some(implied) = derive_stage_from_entries(&entries) else {
                continue;
            };
            let stored = self.stages.get(patient_id).await;
            if stored == Some(implied) {
                continue;
            }

            let mut finding = MappingMismatch {
                patient_id,
                stored_stage: stored,
                implied_stage: implied,
                open_entry_count: entries.len(),
                repaired: false,
            };

            if repair {
                match self
                    .orchestrator
                    .apply_repair(patient_id, implied, "排队台账与阶段存档不一致")
                    .await
                {
                    Ok(()) => finding.repaired = true,
                    Err(e) => error!(
                        "failed to repair stage mapping for patient {}: {}",
                        patient_id, e
                    ),
                }
            }

            report.mapping_mismatches.push(finding);
        }
    }

    /// 孤儿清扫
    ///
    /// 活动阶段、无未结束排队记录、预约协作方也查不到后续就诊
    /// 的患者即为孤儿；修复模式下移到已完成。
    async fn sweep_orphans(&self, report: &mut AuditReport, repair: bool) {
        for record in self.stages.records().await {
            if !record.stage.is_active() {
                continue;
            }
            if !self
                .ledger
                .open_entries_for_patient(record.patient_id)
                .await
                .is_empty()
            {
                continue;
            }
            if self.appointments.has_future_visit(record.patient_id).await {
                continue;
            }

            let mut finding = OrphanFinding {
                patient_id: record.patient_id,
                stored_stage: record.stage,
                repaired: false,
            };

            if repair {
                match self
                    .orchestrator
                    .apply_repair(
                        record.patient_id,
                        JourneyStage::Completed,
                        "活动阶段下无排队记录且无后续预约",
                    )
                    .await
                {
                    Ok(()) => finding.repaired = true,
                    Err(e) => error!(
                        "failed to repair orphan patient {}: {}",
                        record.patient_id, e
                    ),
                }
            }

            report.orphans.push(finding);
        }
    }
}
