use std::sync::Arc;
use std::time::Duration;

use domain::{DomainError, PhoneNumber, Timestamp, VerificationCode};
use thiserror::Error;

use crate::clock::Clock;
use crate::verification::sms::{SmsError, SmsSender};
use crate::verification::store::{Lookup, StoreError, VerificationRecord, VerificationStore};

/// 验证码投递方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// 通过短信服务发送
    Sms,
    /// 非生产环境：验证码直接返回给调用方
    Echo,
}

#[derive(Debug, Clone)]
pub struct VerificationPolicy {
    pub code_ttl: Duration,
    pub delivery: DeliveryMode,
    /// 短信正文里的应用名称
    pub app_name: String,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            code_ttl: Duration::from_secs(600),
            delivery: DeliveryMode::Echo,
            app_name: "RJ Chats".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("invalid phone number format, please enter a valid mobile number")]
    InvalidPhoneNumber,
    #[error("no verification code found for this number, please request a new one")]
    NotFound,
    #[error("verification code has expired, please request a new one")]
    Expired,
    #[error("invalid verification code, please try again")]
    Mismatch,
    #[error("sms provider rejected the destination: {0}")]
    ProviderRejected(String),
    #[error("failed to send verification code: {message}")]
    ProviderError { status: Option<u16>, message: String },
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<DomainError> for VerificationError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidPhoneNumber => VerificationError::InvalidPhoneNumber,
            other => VerificationError::InvalidInput(other.to_string()),
        }
    }
}

impl From<SmsError> for VerificationError {
    fn from(value: SmsError) -> Self {
        match value {
            SmsError::InvalidDestination(_) => VerificationError::InvalidPhoneNumber,
            SmsError::NotPermitted(message) => VerificationError::ProviderRejected(message),
            SmsError::Provider { status, message } => {
                VerificationError::ProviderError { status, message }
            }
        }
    }
}

/// 发码结果
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub phone: PhoneNumber,
    pub expires_at: Timestamp,
    /// 仅在 Echo 模式下返回
    pub code: Option<VerificationCode>,
    pub message_id: Option<String>,
}

/// 校验结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub phone: PhoneNumber,
    pub verified: bool,
}

pub struct PhoneVerificationServiceDependencies {
    pub store: Arc<dyn VerificationStore>,
    pub sms: Arc<dyn SmsSender>,
    pub clock: Arc<dyn Clock>,
    pub policy: VerificationPolicy,
}

/// 手机号验证服务
///
/// 每个号码的状态：无记录 → 待确认 → 确认成功 / 过期，两种终态都会删除记录。
pub struct PhoneVerificationService {
    store: Arc<dyn VerificationStore>,
    sms: Arc<dyn SmsSender>,
    clock: Arc<dyn Clock>,
    policy: VerificationPolicy,
}

impl PhoneVerificationService {
    pub fn new(deps: PhoneVerificationServiceDependencies) -> Self {
        Self {
            store: deps.store,
            sms: deps.sms,
            clock: deps.clock,
            policy: deps.policy,
        }
    }

    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    /// 生成并保存验证码，覆盖该号码之前未确认的验证码
    pub async fn issue(&self, raw_phone: &str) -> Result<IssuedCode, VerificationError> {
        if raw_phone.trim().is_empty() {
            return Err(VerificationError::InvalidInput(
                "phone number is required".to_string(),
            ));
        }
        let phone = PhoneNumber::parse(raw_phone)?;
        let code = VerificationCode::generate();
        let expires_at = self.clock.now() + ttl_delta(self.policy.code_ttl);

        self.store
            .put(
                &phone,
                VerificationRecord {
                    code: code.clone(),
                    expires_at,
                },
            )
            .await?;

        match self.policy.delivery {
            DeliveryMode::Echo => {
                tracing::info!(phone = %phone, code = %code, "echo mode: verification code not sent");
                Ok(IssuedCode {
                    phone,
                    expires_at,
                    code: Some(code),
                    message_id: None,
                })
            }
            DeliveryMode::Sms => {
                let body = format!(
                    "Your {} verification code is: {}. Valid for {}.",
                    self.policy.app_name,
                    code,
                    describe_ttl(self.policy.code_ttl)
                );

                // 存储操作已经结束，这里不持有任何锁
                match self.sms.send(&phone, &body).await {
                    Ok(receipt) => {
                        tracing::info!(phone = %phone, message_id = %receipt.message_id, "verification code sent");
                        Ok(IssuedCode {
                            phone,
                            expires_at,
                            code: None,
                            message_id: Some(receipt.message_id),
                        })
                    }
                    Err(err) => {
                        tracing::error!(phone = %phone, error = %err, "failed to send verification code");
                        // 撤回本次写入的记录；若已被新验证码覆盖则保持不动
                        if let Err(store_err) = self.store.remove_if_code(&phone, &code).await {
                            tracing::warn!(phone = %phone, error = %store_err, "failed to withdraw undelivered code");
                        }
                        Err(err.into())
                    }
                }
            }
        }
    }

    /// 校验验证码。成功后记录被删除，同一验证码只能成功一次。
    pub async fn confirm(
        &self,
        raw_phone: &str,
        submitted: &str,
    ) -> Result<Confirmation, VerificationError> {
        if raw_phone.trim().is_empty() || submitted.trim().is_empty() {
            return Err(VerificationError::InvalidInput(
                "phone number and code are required".to_string(),
            ));
        }
        let phone = PhoneNumber::parse(raw_phone)?;
        let code = VerificationCode::submitted(submitted)?;
        let now = self.clock.now();

        let record = match self.store.lookup(&phone, now).await? {
            Lookup::Missing => return Err(VerificationError::NotFound),
            Lookup::Expired => {
                tracing::info!(phone = %phone, "verification code expired");
                return Err(VerificationError::Expired);
            }
            Lookup::Live(record) => record,
        };

        if record.code != code {
            tracing::info!(phone = %phone, "verification code mismatch");
            return Err(VerificationError::Mismatch);
        }

        if self.store.remove_if_code(&phone, &code).await? {
            tracing::info!(phone = %phone, "phone number verified");
            return Ok(Confirmation {
                phone,
                verified: true,
            });
        }

        // 比较与删除之间记录被并发消费或被新验证码覆盖
        match self.store.lookup(&phone, now).await? {
            Lookup::Live(_) => Err(VerificationError::Mismatch),
            Lookup::Expired => Err(VerificationError::Expired),
            Lookup::Missing => Err(VerificationError::NotFound),
        }
    }
}

fn ttl_delta(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX)
}

fn describe_ttl(ttl: Duration) -> String {
    let secs = ttl.as_secs();
    match secs {
        60 => "1 minute".to_string(),
        s if s >= 60 && s % 60 == 0 => format!("{} minutes", s / 60),
        s => format!("{s} seconds"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::verification::sms::{MockSmsSender, SmsReceipt};
    use crate::verification::store::MemoryVerificationStore;

    struct Fixture {
        service: PhoneVerificationService,
        store: Arc<MemoryVerificationStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture(delivery: DeliveryMode, sms: MockSmsSender) -> Fixture {
        let store = Arc::new(MemoryVerificationStore::new());
        let clock = Arc::new(ManualClock::default());
        let service = PhoneVerificationService::new(PhoneVerificationServiceDependencies {
            store: store.clone(),
            sms: Arc::new(sms),
            clock: clock.clone(),
            policy: VerificationPolicy {
                delivery,
                ..VerificationPolicy::default()
            },
        });
        Fixture {
            service,
            store,
            clock,
        }
    }

    fn echo_fixture() -> Fixture {
        let mut sms = MockSmsSender::new();
        sms.expect_send().never();
        fixture(DeliveryMode::Echo, sms)
    }

    async fn issue_code(f: &Fixture, phone: &str) -> String {
        f.service
            .issue(phone)
            .await
            .unwrap()
            .code
            .unwrap()
            .as_str()
            .to_string()
    }

    #[tokio::test]
    async fn test_issue_normalizes_and_stores_with_ttl() {
        let f = echo_fixture();
        let issued = f.service.issue("9876543210").await.unwrap();

        assert_eq!(issued.phone.as_str(), "+919876543210");
        assert_eq!(issued.expires_at, f.clock.now() + chrono::Duration::minutes(10));
        let code = issued.code.unwrap();
        assert_eq!(code.as_str().len(), 6);
        assert!(code.as_str().chars().all(|c| c.is_ascii_digit()));
        assert_eq!(f.store.len(), 1);
    }

    #[tokio::test]
    async fn test_confirm_is_single_use() {
        let f = echo_fixture();
        let code = issue_code(&f, "9876543210").await;

        let confirmation = f.service.confirm("+91 98765 43210", &code).await.unwrap();
        assert!(confirmation.verified);
        assert!(matches!(
            f.service.confirm("9876543210", &code).await,
            Err(VerificationError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_expired_code_is_rejected_and_purged() {
        let f = echo_fixture();
        let code = issue_code(&f, "9876543210").await;
        f.clock.advance(chrono::Duration::minutes(10) + chrono::Duration::seconds(1));

        assert!(matches!(
            f.service.confirm("9876543210", &code).await,
            Err(VerificationError::Expired)
        ));
        assert!(f.store.is_empty());
        assert!(matches!(
            f.service.confirm("9876543210", &code).await,
            Err(VerificationError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_expired_wins_over_wrong_code() {
        let f = echo_fixture();
        issue_code(&f, "9876543210").await;
        f.clock.advance(chrono::Duration::minutes(11));

        assert!(matches!(
            f.service.confirm("9876543210", "000000").await,
            Err(VerificationError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_mismatch_keeps_record_for_retry() {
        let f = echo_fixture();
        let code = issue_code(&f, "9876543210").await;
        let wrong = if code == "123456" { "654321" } else { "123456" };

        assert!(matches!(
            f.service.confirm("9876543210", wrong).await,
            Err(VerificationError::Mismatch)
        ));
        f.clock.advance(chrono::Duration::minutes(5));
        assert!(f.service.confirm("9876543210", &code).await.unwrap().verified);
    }

    #[tokio::test]
    async fn test_reissue_invalidates_previous_code() {
        let f = echo_fixture();
        let first = issue_code(&f, "9876543210").await;
        let mut second = issue_code(&f, "9876543210").await;
        while second == first {
            second = issue_code(&f, "9876543210").await;
        }

        assert!(matches!(
            f.service.confirm("9876543210", &first).await,
            Err(VerificationError::Mismatch)
        ));
        assert!(f.service.confirm("9876543210", &second).await.unwrap().verified);
        assert!(matches!(
            f.service.confirm("9876543210", &first).await,
            Err(VerificationError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_storage() {
        let f = echo_fixture();
        assert!(matches!(
            f.service.issue("12345").await,
            Err(VerificationError::InvalidPhoneNumber)
        ));
        assert!(matches!(
            f.service.issue("   ").await,
            Err(VerificationError::InvalidInput(_))
        ));
        assert!(matches!(
            f.service.confirm("9876543210", " ").await,
            Err(VerificationError::InvalidInput(_))
        ));
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_sms_mode_sends_code_without_returning_it() {
        let mut sms = MockSmsSender::new();
        sms.expect_send()
            .withf(|to, body| {
                to.as_str() == "+919876543210"
                    && body.starts_with("Your RJ Chats verification code is: ")
                    && body.ends_with("Valid for 10 minutes.")
            })
            .times(1)
            .returning(|_, _| {
                Ok(SmsReceipt {
                    message_id: "SM123".to_string(),
                })
            });
        let f = fixture(DeliveryMode::Sms, sms);

        let issued = f.service.issue("9876543210").await.unwrap();
        assert!(issued.code.is_none());
        assert_eq!(issued.message_id.as_deref(), Some("SM123"));
        assert_eq!(f.store.len(), 1);
    }

    #[tokio::test]
    async fn test_provider_failures_are_mapped_and_record_withdrawn() {
        let cases = [
            (
                SmsError::InvalidDestination("bad".into()),
                "invalid_phone",
            ),
            (SmsError::NotPermitted("trial".into()), "rejected"),
            (SmsError::provider(Some(503), "down"), "provider"),
        ];

        for (sms_error, expected) in cases {
            let mut sms = MockSmsSender::new();
            let returned = sms_error.clone();
            sms.expect_send()
                .times(1)
                .returning(move |_, _| Err(returned.clone()));
            let f = fixture(DeliveryMode::Sms, sms);

            let err = f.service.issue("9876543210").await.unwrap_err();
            match (expected, err) {
                ("invalid_phone", VerificationError::InvalidPhoneNumber) => {}
                ("rejected", VerificationError::ProviderRejected(message)) => {
                    assert_eq!(message, "trial")
                }
                ("provider", VerificationError::ProviderError { status, message }) => {
                    assert_eq!(status, Some(503));
                    assert_eq!(message, "down");
                }
                (expected, other) => panic!("expected {expected}, got {other:?}"),
            }
            assert!(f.store.is_empty());
        }
    }

    #[test]
    fn test_ttl_description() {
        assert_eq!(describe_ttl(Duration::from_secs(600)), "10 minutes");
        assert_eq!(describe_ttl(Duration::from_secs(60)), "1 minute");
        assert_eq!(describe_ttl(Duration::from_secs(90)), "90 seconds");
    }
}
