//! Redis 存储适配器
//!
//! 提供验证码存储和用户在线状态存储。

pub mod error;
pub mod status_store;
pub mod verification_store;

pub use status_store::RedisUserStatusStore;
pub use verification_store::RedisVerificationStore;
