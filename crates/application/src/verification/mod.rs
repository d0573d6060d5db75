//! 手机号验证码
//!
//! 发码、校验两个请求/响应操作，验证码有效期默认 10 分钟，只能成功使用一次。

pub mod service;
pub mod sms;
pub mod store;

pub use service::{
    Confirmation, DeliveryMode, IssuedCode, PhoneVerificationService,
    PhoneVerificationServiceDependencies, VerificationError, VerificationPolicy,
};
pub use sms::{SmsError, SmsReceipt, SmsSender};
pub use store::{
    spawn_sweeper, Lookup, MemoryVerificationStore, StoreError, VerificationRecord,
    VerificationStore, EXPIRED_RETENTION_SECS,
};
