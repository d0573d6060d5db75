use std::sync::Arc;

use application::{ApplicationError, UserStatusStore};
use async_trait::async_trait;
use config::RedisConfig;
use domain::{Timestamp, UserId};

use super::error::infrastructure_error;

/// 将用户在线状态写入 Redis 哈希 `user_status:{user_id}`
pub struct RedisUserStatusStore {
    redis_client: Arc<redis::Client>,
}

impl RedisUserStatusStore {
    pub fn new(redis_config: &RedisConfig) -> Result<Self, ApplicationError> {
        let client = redis::Client::open(redis_config.url.clone()).map_err(infrastructure_error)?;
        Ok(Self {
            redis_client: Arc::new(client),
        })
    }

    fn status_key(user_id: &UserId) -> String {
        format!("user_status:{user_id}")
    }
}

#[async_trait]
impl UserStatusStore for RedisUserStatusStore {
    async fn update_status(
        &self,
        user_id: &UserId,
        is_online: bool,
        changed_at: Timestamp,
    ) -> Result<(), ApplicationError> {
        let mut conn = self
            .redis_client
            .get_multiplexed_async_connection()
            .await
            .map_err(infrastructure_error)?;

        let _: () = redis::cmd("HSET")
            .arg(Self::status_key(user_id))
            .arg("isOnline")
            .arg(if is_online { "1" } else { "0" })
            .arg("changedAt")
            .arg(changed_at.to_rfc3339())
            .query_async(&mut conn)
            .await
            .map_err(infrastructure_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_key_format() {
        let user = UserId::from("u-1");
        assert_eq!(RedisUserStatusStore::status_key(&user), "user_status:u-1");
    }

    #[test]
    fn test_rejects_malformed_url() {
        let config = RedisConfig {
            url: "not a url".to_string(),
        };
        assert!(RedisUserStatusStore::new(&config).is_err());
    }
}
