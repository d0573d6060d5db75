//! 短信发送适配器

pub mod twilio;

use application::{SmsError, SmsReceipt, SmsSender};
use async_trait::async_trait;
use domain::PhoneNumber;
use uuid::Uuid;

pub use twilio::{TwilioCredentials, TwilioSmsSender};

/// 未配置短信服务商时使用，只把短信内容写入日志
#[derive(Debug, Default, Clone)]
pub struct LoggingSmsSender;

#[async_trait]
impl SmsSender for LoggingSmsSender {
    async fn send(&self, to: &PhoneNumber, body: &str) -> Result<SmsReceipt, SmsError> {
        let message_id = format!("log-{}", Uuid::new_v4());
        tracing::info!(to = %to, message_id = %message_id, body, "sms delivery logged");
        Ok(SmsReceipt { message_id })
    }
}
