//! 基础设施层实现。
//!
//! 提供短信发送、Redis 存储等适配器，实现应用层定义的接口。

pub mod sms;
pub mod storage;

pub use sms::{LoggingSmsSender, TwilioCredentials, TwilioSmsSender};
pub use storage::{RedisUserStatusStore, RedisVerificationStore};
