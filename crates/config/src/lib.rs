//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 服务监听与 CORS
//! - WebSocket 连接
//! - 手机验证码
//! - 短信服务
//! - 在线状态广播
//!
//! 加载顺序：内置默认值 → YAML 文件（`CHAT_CONFIG_FILE`，默认 `config.yaml`）
//! → `CHAT_` 前缀环境变量（嵌套字段用 `__` 分隔，如 `CHAT_SERVER__PORT`）。

use std::{env, time::Duration};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "CHAT_";
/// 指定配置文件路径的环境变量
pub const CONFIG_FILE_ENV: &str = "CHAT_CONFIG_FILE";

/// 运行环境
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// 开发环境：验证码直接返回给调用方，不发送短信
    #[default]
    Development,
    Production,
}

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub environment: Environment,
    /// 服务配置
    pub server: ServerConfig,
    /// WebSocket配置
    pub websocket: WebSocketConfig,
    /// 验证码配置
    pub verification: VerificationConfig,
    /// 短信服务配置
    pub sms: SmsConfig,
    /// 在线状态配置
    pub presence: PresenceConfig,
    /// Redis配置，未设置时验证码保存在内存
    pub redis: Option<RedisConfig>,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 允许跨域的来源，为空时不限制
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

/// WebSocket配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// 多久收不到客户端任何帧（包括 Pong）就断开
    pub idle_timeout_secs: u64,
    /// 服务器发送 Ping 的间隔，必须小于空闲超时
    pub ping_interval_secs: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 60,
            ping_interval_secs: 25,
        }
    }
}

impl WebSocketConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

/// 验证码配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// 验证码有效期（秒）
    pub code_ttl_secs: u64,
    /// 过期记录清理周期（秒），0 表示只依赖读取时的惰性过期
    pub sweep_interval_secs: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: 600,
            sweep_interval_secs: 60,
        }
    }
}

impl VerificationConfig {
    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.code_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

/// 短信服务（Twilio）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub api_base: String,
    /// 短信正文中的应用名称
    pub app_name: String,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from_number: None,
            api_base: "https://api.twilio.com".to_string(),
            app_name: "RJ Chats".to_string(),
        }
    }
}

impl SmsConfig {
    /// 三项凭据是否都已配置
    pub fn has_credentials(&self) -> bool {
        [&self.account_sid, &self.auth_token, &self.from_number]
            .iter()
            .all(|value| value.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }
}

/// 在线状态配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// 状态未变化时是否仍然广播
    pub broadcast_duplicates: bool,
    /// 只有用户最后一个连接断开时才广播离线
    pub offline_on_last_session: bool,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            broadcast_duplicates: true,
            offline_on_last_session: true,
        }
    }
}

/// Redis配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

impl AppConfig {
    /// 构建配置来源链
    pub fn figment() -> Figment {
        let file = env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| "config.yaml".to_string());
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// 加载并校验配置
    pub fn load() -> Result<Self, ConfigError> {
        let config: AppConfig = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "port must be greater than 0".to_string(),
            ));
        }

        if self.verification.code_ttl_secs == 0 {
            return Err(ConfigError::InvalidVerificationConfig(
                "code ttl must be greater than 0".to_string(),
            ));
        }

        if self.websocket.idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "websocket idle timeout must be greater than 0".to_string(),
            ));
        }

        if self.websocket.ping_interval_secs == 0
            || self.websocket.ping_interval_secs >= self.websocket.idle_timeout_secs
        {
            return Err(ConfigError::InvalidServerConfig(
                "websocket ping interval must be between 0 and the idle timeout".to_string(),
            ));
        }

        // 生产环境必须能真正发出短信
        if self.is_production() && !self.sms.has_credentials() {
            return Err(ConfigError::MissingSmsCredentials);
        }

        if let Some(redis) = &self.redis {
            if !redis.url.starts_with("redis://") && !redis.url.starts_with("rediss://") {
                return Err(ConfigError::InvalidRedisUrl(redis.url.clone()));
            }
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
    #[error("Invalid verification configuration: {0}")]
    InvalidVerificationConfig(String),
    #[error("SMS credentials (account_sid, auth_token, from_number) are required in production")]
    MissingSmsCredentials,
    #[error("Invalid redis url: {0}")]
    InvalidRedisUrl(String),
}
