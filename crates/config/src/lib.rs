//! 统一配置中心
//!
//! 加载顺序：内置默认值 → `APP_CONFIG_FILE` 指向的文件（按扩展名识别 toml/yaml/json）
//! → `APP_` 前缀的环境变量（`__` 分隔嵌套层级，如 `APP_JWT__SECRET`）。

use std::time::Duration;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_ENV: &str = "APP_CONFIG_FILE";
pub const ENV_PREFIX: &str = "APP_";

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub hub: HubConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 为空时允许任意来源
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            cors_origins: Vec::new(),
        }
    }
}

/// 数据库配置。未设置 `url` 时使用进程内存储。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

/// JWT配置。密钥没有默认值，必须显式提供。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            expiration_hours: 24,
        }
    }
}

/// 连接中枢配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// 心跳周期；一个周期内毫无响应的连接被关闭
    pub heartbeat_interval_secs: u64,
    /// 未完成认证的连接最多保留多久
    pub anonymous_timeout_secs: u64,
    /// 每条连接的出站缓冲区容量
    pub outbound_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            anonymous_timeout_secs: 60,
            outbound_buffer: 64,
        }
    }
}

impl HubConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn anonymous_timeout(&self) -> Duration {
        Duration::from_secs(self.anonymous_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub bcrypt_cost: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self { bcrypt_cost: 12 }
    }
}

impl AppConfig {
    /// 按默认值 → 配置文件 → 环境变量的顺序加载并校验
    pub fn load() -> Result<Self, ConfigError> {
        let config: AppConfig = Self::figment().extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn figment() -> Figment {
        let mut fig = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            if path.ends_with(".yml") || path.ends_with(".yaml") {
                fig = fig.merge(Yaml::file(path));
            } else if path.ends_with(".json") {
                fig = fig.merge(Json::file(path));
            } else {
                fig = fig.merge(Toml::file(path));
            }
        }
        fig.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 至少256位/32字节
        if self.jwt.secret.len() < 32 {
            return Err(ConfigError::InvalidJwtSecret(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }
        if self.jwt.expiration_hours <= 0 {
            return Err(ConfigError::InvalidJwtSecret(
                "expiration_hours must be positive".to_string(),
            ));
        }

        if let Some(url) = &self.database.url {
            if url.trim().is_empty() {
                return Err(ConfigError::InvalidDatabaseConfig(
                    "Database URL cannot be empty".to_string(),
                ));
            }
            if self.database.max_connections == 0 {
                return Err(ConfigError::InvalidDatabaseConfig(
                    "Max connections must be greater than 0".to_string(),
                ));
            }
        }

        if self.hub.heartbeat_interval_secs == 0 || self.hub.anonymous_timeout_secs == 0 {
            return Err(ConfigError::InvalidHubConfig(
                "heartbeat and anonymous timeout must be greater than 0".to_string(),
            ));
        }
        if self.hub.outbound_buffer == 0 {
            return Err(ConfigError::InvalidHubConfig(
                "outbound buffer must be greater than 0".to_string(),
            ));
        }

        if !(4..=31).contains(&self.security.bcrypt_cost) {
            return Err(ConfigError::InvalidServerConfig(
                "bcrypt cost must be between 4 and 31".to_string(),
            ));
        }

        Ok(())
    }

    /// 可以写进日志的配置摘要（不含密钥与数据库口令）
    pub fn sanitized(&self) -> String {
        let database = match &self.database.url {
            Some(url) => redact_url(url),
            None => "in-memory".to_string(),
        };
        format!(
            "server={}:{} database={} hub.heartbeat={}s hub.anonymous_timeout={}s hub.outbound_buffer={}",
            self.server.host,
            self.server.port,
            database,
            self.hub.heartbeat_interval_secs,
            self.hub.anonymous_timeout_secs,
            self.hub.outbound_buffer,
        )
    }
}

fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://[REDACTED]{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("Invalid JWT secret: {0}")]
    InvalidJwtSecret(String),
    #[error("Invalid database configuration: {0}")]
    InvalidDatabaseConfig(String),
    #[error("Invalid hub configuration: {0}")]
    InvalidHubConfig(String),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
}
