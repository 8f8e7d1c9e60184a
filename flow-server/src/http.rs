//! RESTful API接口模块
//!
//! 把协调器、通知器与审计器暴露为薄HTTP层，
//! 引擎语义之外不做任何业务处理。

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use flow_audit::ConsistencyAuditor;
use flow_core::{ActionRequest, ActorClass, FlowAction, FlowError};
use flow_engine::{FlowOrchestrator, TransitionLog};
use flow_notify::ChangeNotifier;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// API状态管理器
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<FlowOrchestrator>,
    pub notifier: Arc<ChangeNotifier>,
    pub transition_log: Arc<TransitionLog>,
    pub auditor: Arc<ConsistencyAuditor>,
}

/// 操作请求体，患者标识取自路径
#[derive(Debug, Deserialize)]
pub struct ActionBody {
    pub actor_id: Uuid,
    pub actor_class: ActorClass,
    #[serde(flatten)]
    pub action: FlowAction,
}

#[derive(Debug, Deserialize)]
pub struct AuditParams {
    #[serde(default)]
    pub repair: bool,
}

fn error_response(error: FlowError) -> (StatusCode, Json<Value>) {
    let status = match &error {
        FlowError::InvalidAction { .. } => StatusCode::CONFLICT,
        FlowError::InvalidEntryTransition { .. } => StatusCode::CONFLICT,
        FlowError::DuplicateOpenEntry { .. } => StatusCode::CONFLICT,
        FlowError::NoState(_) | FlowError::NotFound(_) => StatusCode::NOT_FOUND,
        FlowError::Permission(_) => StatusCode::FORBIDDEN,
        FlowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        FlowError::NotificationDelivery(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": error.to_string() })))
}

/// API处理器
pub struct ApiHandler;

impl ApiHandler {
    /// 健康检查
    pub async fn health_check() -> Json<HashMap<String, String>> {
        let mut status = HashMap::new();
        status.insert("status".to_string(), "healthy".to_string());
        status.insert("timestamp".to_string(), chrono::Utc::now().to_rfc3339());
        Json(status)
    }

    /// 初始化患者旅程记录
    pub async fn init_patient(
        State(state): State<ApiState>,
        Path(patient_id): Path<Uuid>,
    ) -> (StatusCode, Json<Value>) {
        let outcome = state.orchestrator.init_patient(patient_id).await;
        (StatusCode::CREATED, Json(json!(outcome)))
    }

    /// 执行流转操作
    ///
    /// 无效操作返回"当前状态下不可用"以及当前合法的操作列表，
    /// 客户端据此自行纠正。
    pub async fn perform_action(
        State(state): State<ApiState>,
        Path(patient_id): Path<Uuid>,
        Json(body): Json<ActionBody>,
    ) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
        debug!("action {:?} for patient {}", body.action.kind(), patient_id);

        let request = ActionRequest {
            actor_id: body.actor_id,
            actor_class: body.actor_class,
            patient_id,
            action: body.action,
        };

        match state.orchestrator.perform_action(request).await {
            Ok(outcome) => Ok(Json(json!(outcome))),
            Err(error @ FlowError::InvalidAction { .. }) => {
                let available = state
                    .orchestrator
                    .available_actions(patient_id)
                    .await
                    .unwrap_or_default();
                Err((
                    StatusCode::CONFLICT,
                    Json(json!({
                        "error": error.to_string(),
                        "available_actions": available,
                    })),
                ))
            }
            Err(error) => Err(error_response(error)),
        }
    }

    /// 患者快照
    pub async fn patient_snapshot(
        State(state): State<ApiState>,
        Path(patient_id): Path<Uuid>,
    ) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
        match state.notifier.pull_patient(patient_id).await {
            Ok(snapshot) => Ok(Json(json!(snapshot))),
            Err(error) => Err(error_response(error)),
        }
    }

    /// 站点看板拉取式重同步
    pub async fn station_snapshot(
        State(state): State<ApiState>,
        Path(station_id): Path<Uuid>,
    ) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
        match state.notifier.pull_station(station_id).await {
            Ok(snapshot) => Ok(Json(json!(snapshot))),
            Err(error) => Err(error_response(error)),
        }
    }

    /// 全院监控快照
    pub async fn facility_snapshot(
        State(state): State<ApiState>,
    ) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
        match state.notifier.pull_facility().await {
            Ok(snapshot) => Ok(Json(json!(snapshot))),
            Err(error) => Err(error_response(error)),
        }
    }

    /// 患者流转时间线
    pub async fn patient_log(
        State(state): State<ApiState>,
        Path(patient_id): Path<Uuid>,
    ) -> Json<Value> {
        let timeline = state.transition_log.for_patient(patient_id).await;
        Json(json!(timeline))
    }

    /// 按需运行一致性审计
    pub async fn run_audit(
        State(state): State<ApiState>,
        Query(params): Query<AuditParams>,
    ) -> Json<Value> {
        let report = state.auditor.run(params.repair).await;
        Json(json!(report))
    }
}

/// 创建API路由
pub fn create_api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(ApiHandler::health_check))
        .route("/api/patients/:id", post(ApiHandler::init_patient))
        .route("/api/patients/:id/actions", post(ApiHandler::perform_action))
        .route("/api/patients/:id/snapshot", get(ApiHandler::patient_snapshot))
        .route("/api/patients/:id/log", get(ApiHandler::patient_log))
        .route("/api/stations/:id/snapshot", get(ApiHandler::station_snapshot))
        .route("/api/facility/snapshot", get(ApiHandler::facility_snapshot))
        .route("/api/audit", post(ApiHandler::run_audit))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
}
