use async_trait::async_trait;
use domain::PhoneNumber;
use thiserror::Error;

/// 短信发送回执
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsReceipt {
    /// 服务商返回的消息ID
    pub message_id: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SmsError {
    /// 目标号码格式不被服务商接受
    #[error("invalid destination number: {0}")]
    InvalidDestination(String),
    /// 当前账户策略不允许发送到该号码（如试用账户、地区限制）
    #[error("destination not permitted: {0}")]
    NotPermitted(String),
    #[error("sms provider error (status {status:?}): {message}")]
    Provider { status: Option<u16>, message: String },
}

impl SmsError {
    pub fn provider(status: Option<u16>, message: impl Into<String>) -> Self {
        SmsError::Provider {
            status,
            message: message.into(),
        }
    }
}

/// 短信发送能力（外部协作方）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &PhoneNumber, body: &str) -> Result<SmsReceipt, SmsError>;
}
