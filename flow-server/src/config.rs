//! 服务端配置
//!
//! 支持配置文件与 `FLOW_` 前缀环境变量覆盖。

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// 服务端完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 通知频道容量，慢观察者最多积压的消息数
    pub channel_capacity: usize,
    /// 定时审计间隔（秒），0 表示关闭
    pub audit_interval_secs: u64,
    /// 预测协作方的每人预估服务时长（分钟）
    pub forecast_minutes_per_patient: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            channel_capacity: 64,
            audit_interval_secs: 300,
            forecast_minutes_per_patient: 10,
        }
    }
}

impl ServerConfig {
    /// 加载配置：默认值 <- 配置文件 <- 环境变量
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8080i64)?
            .set_default("channel_capacity", 64i64)?
            .set_default("audit_interval_secs", 300i64)?
            .set_default("forecast_minutes_per_patient", 10i64)?;

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(Environment::with_prefix("FLOW"));

        Ok(builder.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.channel_capacity, 64);
        assert_eq!(config.audit_interval_secs, 300);
    }
}
