//! 患者流转服务主程序

mod config;
mod http;

use clap::Parser;
use flow_audit::ConsistencyAuditor;
use flow_core::collaborators::{FixedRateForecast, StaticAppointmentBook};
use flow_engine::FlowEngine;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::http::{create_api_routes, ApiState};

/// 患者流转服务命令行参数
#[derive(Parser, Debug)]
#[command(name = "flow-server")]
#[command(about = "门诊患者流转与候诊队列服务")]
struct Args {
    /// 监听端口，覆盖配置文件
    #[arg(short, long)]
    port: Option<u16>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&args.log_level))
        .init();

    info!("启动患者流转服务...");

    let mut server_config = ServerConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        server_config.port = port;
    }

    info!("服务配置:");
    info!("  监听地址: {}:{}", server_config.host, server_config.port);
    info!("  通知频道容量: {}", server_config.channel_capacity);
    info!("  审计间隔: {}秒", server_config.audit_interval_secs);

    // 装配引擎与协作方
    let forecast = Arc::new(FixedRateForecast::new(
        server_config.forecast_minutes_per_patient,
    ));
    let engine = FlowEngine::new(Some(forecast), server_config.channel_capacity);
    let appointments = Arc::new(StaticAppointmentBook::new());
    let auditor = Arc::new(ConsistencyAuditor::new(
        engine.orchestrator(),
        engine.ledger(),
        engine.stages(),
        appointments,
    ));

    // 定时审计只报告不修复，修复通过审计接口显式触发
    if server_config.audit_interval_secs > 0 {
        let periodic = auditor.clone();
        let interval_secs = server_config.audit_interval_secs;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = periodic.run(false).await;
                if !report.is_clean() {
                    warn!("定时审计发现 {} 个问题", report.total_findings());
                }
            }
        });
    }

    let state = ApiState {
        orchestrator: engine.orchestrator(),
        notifier: engine.notifier(),
        transition_log: engine.transition_log(),
        auditor,
    };

    let addr = format!("{}:{}", server_config.host, server_config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP服务监听于 {}", addr);

    axum::serve(listener, create_api_routes(state)).await?;

    Ok(())
}
