//! Redis 错误映射

use application::verification::StoreError;
use application::ApplicationError;

/// 将 Redis 错误转换为存储错误
pub fn store_error(err: redis::RedisError) -> StoreError {
    match err.kind() {
        redis::ErrorKind::TypeError => StoreError::Corrupted(err.to_string()),
        _ => StoreError::Unavailable(err.to_string()),
    }
}

/// 将 Redis 错误转换为应用层基础设施错误
pub fn infrastructure_error(err: redis::RedisError) -> ApplicationError {
    ApplicationError::infrastructure(format!("redis error: {err}"))
}
