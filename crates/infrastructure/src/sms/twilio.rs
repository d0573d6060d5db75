//! Twilio 短信适配器
//!
//! 调用 Twilio REST API 发送短信，并把服务商错误码映射为 `SmsError`。

use std::time::Duration;

use application::{SmsError, SmsReceipt, SmsSender};
use async_trait::async_trait;
use config::SmsConfig;
use domain::PhoneNumber;
use serde::Deserialize;

/// 目标号码格式无效
const ERROR_INVALID_TO_NUMBER: u32 = 21211;
/// 目标号码不是可接收短信的手机号
const ERROR_NOT_MOBILE_NUMBER: u32 = 21614;
/// 账户未开通向该地区发送短信的权限
const ERROR_REGION_NOT_ENABLED: u32 = 21408;
/// 试用账户只能发送到已验证号码
const ERROR_UNVERIFIED_TRIAL_NUMBER: u32 = 21608;
/// 用户已退订
const ERROR_RECIPIENT_UNSUBSCRIBED: u32 = 21610;

/// Twilio 账户凭据
#[derive(Debug, Clone)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

impl TwilioCredentials {
    /// 从配置中读取，任一项缺失时返回 None
    pub fn from_config(config: &SmsConfig) -> Option<Self> {
        if !config.has_credentials() {
            return None;
        }
        Some(Self {
            account_sid: config.account_sid.clone()?,
            auth_token: config.auth_token.clone()?,
            from_number: config.from_number.clone()?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: String,
}

#[derive(Debug, Default, Deserialize)]
struct TwilioErrorBody {
    code: Option<u32>,
    message: Option<String>,
}

pub struct TwilioSmsSender {
    client: reqwest::Client,
    api_base: String,
    credentials: TwilioCredentials,
}

impl TwilioSmsSender {
    pub fn new(api_base: impl Into<String>, credentials: TwilioCredentials) -> Result<Self, SmsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| SmsError::provider(None, format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.credentials.account_sid
        )
    }
}

/// 按 Twilio 错误码分类
fn classify_error(status: u16, body: TwilioErrorBody) -> SmsError {
    let message = body
        .message
        .unwrap_or_else(|| format!("twilio responded with status {status}"));

    match body.code {
        Some(ERROR_INVALID_TO_NUMBER | ERROR_NOT_MOBILE_NUMBER) => SmsError::InvalidDestination(message),
        Some(
            ERROR_REGION_NOT_ENABLED | ERROR_UNVERIFIED_TRIAL_NUMBER | ERROR_RECIPIENT_UNSUBSCRIBED,
        ) => SmsError::NotPermitted(message),
        _ => SmsError::provider(Some(status), message),
    }
}

#[async_trait]
impl SmsSender for TwilioSmsSender {
    async fn send(&self, to: &PhoneNumber, body: &str) -> Result<SmsReceipt, SmsError> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(
                &self.credentials.account_sid,
                Some(&self.credentials.auth_token),
            )
            .form(&[
                ("To", to.as_str()),
                ("From", self.credentials.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "twilio request failed");
                SmsError::provider(err.status().map(|s| s.as_u16()), err.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            let message: TwilioMessage = response.json().await.map_err(|err| {
                SmsError::provider(Some(status.as_u16()), format!("unexpected twilio response: {err}"))
            })?;
            return Ok(SmsReceipt {
                message_id: message.sid,
            });
        }

        let error_body = response.json::<TwilioErrorBody>().await.unwrap_or_default();
        tracing::warn!(
            status = status.as_u16(),
            code = ?error_body.code,
            "twilio rejected message"
        );
        Err(classify_error(status.as_u16(), error_body))
    }
}
