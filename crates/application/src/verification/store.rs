use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use domain::{PhoneNumber, Timestamp, VerificationCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::clock::Clock;

/// 记录过期后仍保留的时长，期间读取报告 `Expired` 而不是 `Missing`
pub const EXPIRED_RETENTION_SECS: i64 = 60;

/// 待确认的验证码记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub code: VerificationCode,
    pub expires_at: Timestamp,
}

impl VerificationRecord {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }

    /// 过期且超过保留期，可以被后台清理
    pub fn is_stale(&self, now: Timestamp) -> bool {
        now > self.expires_at + chrono::Duration::seconds(EXPIRED_RETENTION_SECS)
    }
}

/// 查询结果。过期记录在读取时被删除并报告为 `Expired`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Missing,
    Expired,
    Live(VerificationRecord),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("verification store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupted verification record: {0}")]
    Corrupted(String),
}

/// 带过期时间的验证码存储
///
/// 每个手机号最多一条记录，写入无条件覆盖。
#[async_trait]
pub trait VerificationStore: Send + Sync {
    async fn put(&self, phone: &PhoneNumber, record: VerificationRecord) -> Result<(), StoreError>;

    async fn lookup(&self, phone: &PhoneNumber, now: Timestamp) -> Result<Lookup, StoreError>;

    /// 仅当当前记录的验证码等于 `code` 时删除，返回是否删除
    async fn remove_if_code(
        &self,
        phone: &PhoneNumber,
        code: &VerificationCode,
    ) -> Result<bool, StoreError>;

    /// 主动清理过期超过保留期的记录，返回清理数量
    async fn sweep(&self, now: Timestamp) -> Result<usize, StoreError>;
}

/// 内存实现，按分片加锁，不同手机号互不阻塞
#[derive(Default)]
pub struct MemoryVerificationStore {
    records: DashMap<PhoneNumber, VerificationRecord>,
}

impl MemoryVerificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl VerificationStore for MemoryVerificationStore {
    async fn put(&self, phone: &PhoneNumber, record: VerificationRecord) -> Result<(), StoreError> {
        self.records.insert(phone.clone(), record);
        Ok(())
    }

    async fn lookup(&self, phone: &PhoneNumber, now: Timestamp) -> Result<Lookup, StoreError> {
        let record = match self.records.get(phone) {
            Some(record) => record.clone(),
            None => return Ok(Lookup::Missing),
        };

        if record.is_expired(now) {
            self.records
                .remove_if(phone, |_, current| current.is_expired(now));
            return Ok(Lookup::Expired);
        }
        Ok(Lookup::Live(record))
    }

    async fn remove_if_code(
        &self,
        phone: &PhoneNumber,
        code: &VerificationCode,
    ) -> Result<bool, StoreError> {
        Ok(self
            .records
            .remove_if(phone, |_, current| current.code == *code)
            .is_some())
    }

    async fn sweep(&self, now: Timestamp) -> Result<usize, StoreError> {
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = !record.is_stale(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

/// 启动后台清理任务，限制内存中过期记录的数量
pub fn spawn_sweeper(
    store: Arc<dyn VerificationStore>,
    clock: Arc<dyn Clock>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.sweep(clock.now()).await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "swept expired verification codes"),
                Err(err) => tracing::warn!(error = %err, "verification sweep failed"),
            }
        }
    })
}
