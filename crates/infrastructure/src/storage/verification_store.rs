//! Redis 验证码存储
//!
//! 每个手机号一个键，值为 JSON 编码的 `VerificationRecord`。键的 TTL 比记录
//! 过期时间稍长，让过期后的首次读取仍能报告 `Expired`。

use std::sync::Arc;

use application::verification::{
    Lookup, StoreError, VerificationRecord, VerificationStore, EXPIRED_RETENTION_SECS,
};
use async_trait::async_trait;
use chrono::Utc;
use config::RedisConfig;
use domain::{PhoneNumber, Timestamp, VerificationCode};
use redis::Script;
use tracing::debug;

use super::error::store_error;

/// 过期后在 Redis 中保留的时长（毫秒），与内存存储的保留期一致
const EXPIRED_GRACE_MS: i64 = EXPIRED_RETENTION_SECS * 1_000;

/// 仅当值未被改写时删除
const DELETE_IF_UNCHANGED: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// 仅当记录中的验证码匹配时删除
const DELETE_IF_CODE: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return 0
end
local record = cjson.decode(raw)
if record['code'] == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

pub struct RedisVerificationStore {
    redis_client: Arc<redis::Client>,
    key_prefix: String,
}

impl RedisVerificationStore {
    pub fn new(redis_config: &RedisConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_config.url.clone()).map_err(store_error)?;

        Ok(Self {
            redis_client: Arc::new(client),
            key_prefix: "otp:".to_string(),
        })
    }

    fn record_key(&self, phone: &PhoneNumber) -> String {
        format!("{}{}", self.key_prefix, phone)
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.redis_client
            .get_multiplexed_async_connection()
            .await
            .map_err(store_error)
    }
}

/// 键的存活时间：剩余有效期加宽限期，至少 1 毫秒
fn key_ttl_ms(expires_at: Timestamp, now: Timestamp) -> i64 {
    ((expires_at - now).num_milliseconds() + EXPIRED_GRACE_MS).max(1)
}

#[async_trait]
impl VerificationStore for RedisVerificationStore {
    async fn put(&self, phone: &PhoneNumber, record: VerificationRecord) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let payload =
            serde_json::to_string(&record).map_err(|e| StoreError::Corrupted(e.to_string()))?;

        let _: () = redis::cmd("SET")
            .arg(self.record_key(phone))
            .arg(payload)
            .arg("PX")
            .arg(key_ttl_ms(record.expires_at, Utc::now()))
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;

        Ok(())
    }

    async fn lookup(&self, phone: &PhoneNumber, now: Timestamp) -> Result<Lookup, StoreError> {
        let mut conn = self.get_connection().await?;
        let key = self.record_key(phone);

        let raw: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        let Some(raw) = raw else {
            return Ok(Lookup::Missing);
        };

        let record: VerificationRecord =
            serde_json::from_str(&raw).map_err(|e| StoreError::Corrupted(e.to_string()))?;
        if !record.is_expired(now) {
            return Ok(Lookup::Live(record));
        }

        let removed: i64 = Script::new(DELETE_IF_UNCHANGED)
            .key(&key)
            .arg(&raw)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;
        debug!(phone = %phone, removed, "verification code expired");

        Ok(Lookup::Expired)
    }

    async fn remove_if_code(
        &self,
        phone: &PhoneNumber,
        code: &VerificationCode,
    ) -> Result<bool, StoreError> {
        let mut conn = self.get_connection().await?;

        let removed: i64 = Script::new(DELETE_IF_CODE)
            .key(self.record_key(phone))
            .arg(code.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;

        Ok(removed > 0)
    }

    async fn sweep(&self, _now: Timestamp) -> Result<usize, StoreError> {
        // 键的 TTL 由 Redis 负责清理
        Ok(0)
    }
}
