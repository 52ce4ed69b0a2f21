use crate::error::Result;
use crate::models::Role;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 默认配置文件名 (位于当前目录, 可选)
pub const DEFAULT_CONFIG_FILE: &str = "freight-finance.toml";

/// 环境变量前缀, 例如 FREIGHT__API__BASE_URL
pub const ENV_PREFIX: &str = "FREIGHT";

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub messaging: MessagingConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
}

/// 当前登录用户 (令牌由外部登录流程提供)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub uid: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    pub unread_poll_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://127.0.0.1:8000".to_string(),
                auth_token: None,
                timeout_secs: 30,
            },
            session: SessionConfig {
                uid: None,
                role: Role::Carrier,
            },
            messaging: MessagingConfig {
                unread_poll_secs: 15,
            },
            log: LogConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// 加载配置: 默认值 -> 配置文件 (可选) -> 环境变量
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = config::Config::builder()
            .set_default("api.base_url", defaults.api.base_url)?
            .set_default("api.timeout_secs", defaults.api.timeout_secs as i64)?
            .set_default("session.role", "carrier")?
            .set_default(
                "messaging.unread_poll_secs",
                defaults.messaging.unread_poll_secs as i64,
            )?
            .set_default("log.level", defaults.log.level)?;

        builder = match path {
            Some(p) => builder.add_source(config::File::from(p).required(true)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let cfg = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs.max(1))
    }

    pub fn unread_poll_interval(&self) -> Duration {
        Duration::from_secs(self.messaging.unread_poll_secs.max(1))
    }
}
